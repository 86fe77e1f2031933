//! deepnog command line interface
//!
//! `deepnog infer` assigns sequences to orthologous groups with a trained
//! model, `deepnog train` fits a new model from labeled sequences.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

use deepnog::config::{DEFAULT_DATABASE, DEFAULT_FORMAT, DEFAULT_LEVEL};
use deepnog::trainer::{OutputSpec, RandomSuffix, TrainingConfig, TrainingInputs};
use deepnog::{
    validate_batch_size, validate_epoch_count, ArchitectureRegistry, DeepEncoding, DeviceRequest,
    InferenceConfig, OutputFormat, OutputSink, RunContext, WeightsResolver,
};

#[derive(Parser)]
#[command(name = "deepnog")]
#[command(about = "Assign proteins to orthologous groups with deep networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict orthologous groups of protein sequences
    Infer(InferArgs),
    /// Train a classifier for a custom set of orthologous groups
    Train(TrainArgs),
}

/// Options shared by both subcommands
#[derive(Args)]
struct CommonArgs {
    /// Sequence file format
    #[arg(short = 'f', long = "fformat", default_value = DEFAULT_FORMAT)]
    format: String,

    /// Log verbosity: 0 error, 1 warn, 2 info, 3 debug
    #[arg(long, default_value_t = 3)]
    verbose: u8,

    /// Compute device (auto, cpu, gpu)
    #[arg(short, long, default_value = "auto")]
    device: DeviceRequest,

    /// Loader threads; 0 loads batches on the main thread
    #[arg(long, default_value_t = 0)]
    num_workers: usize,

    /// Network architecture
    #[arg(short, long, default_value = DeepEncoding::NAME)]
    architecture: String,

    /// Sequences per batch
    #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
    batch_size: i64,

    /// Orthologous group database
    #[arg(long, default_value = DEFAULT_DATABASE)]
    database: String,

    /// Taxonomic level within the database
    #[arg(short, long, default_value = DEFAULT_LEVEL)]
    tax: String,
}

#[derive(Args)]
struct InferArgs {
    /// Protein sequences to classify
    sequence_file: PathBuf,

    #[command(flatten)]
    common: CommonArgs,

    /// Model file; defaults to the installed weights for database and level
    #[arg(short, long)]
    weights: Option<PathBuf>,

    /// Root of installed weights
    #[arg(long, env = "DEEPNOG_DATA")]
    data_dir: Option<PathBuf>,

    /// Output file or directory; stdout when absent
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Table format (csv, tsv, legacy)
    #[arg(long, default_value = "csv")]
    outformat: OutputFormat,

    /// Minimum confidence for reporting a prediction
    #[arg(short, long, allow_negative_numbers = true)]
    confidence_threshold: Option<f32>,
}

#[derive(Args)]
struct TrainArgs {
    /// Training sequences
    training_file: PathBuf,

    /// Validation sequences
    validation_file: PathBuf,

    /// CSV mapping sequence identifiers to orthologous groups
    labels_file: PathBuf,

    #[command(flatten)]
    common: CommonArgs,

    /// Directory receiving the trained model and evaluation files
    #[arg(short, long)]
    out: PathBuf,

    /// Number of training epochs
    #[arg(short = 'e', long, default_value_t = 15, allow_negative_numbers = true)]
    n_epochs: i64,

    /// Initial learning rate
    #[arg(long, default_value_t = 1e-2)]
    learning_rate: f64,

    /// Per-epoch learning rate decay
    #[arg(long, default_value_t = 0.75)]
    gamma: f64,

    /// Seed for shuffling
    #[arg(long, default_value_t = 123)]
    seed: u64,

    /// Keep the training order of the input file
    #[arg(long)]
    no_shuffle: bool,
}

impl Cli {
    fn verbose(&self) -> u8 {
        match &self.command {
            Commands::Infer(args) => args.common.verbose,
            Commands::Train(args) => args.common.verbose,
        }
    }
}

/// stderr subscriber at the requested verbosity
fn log_context(verbose: u8) -> RunContext {
    let level = match verbose {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    RunContext::new(tracing::Dispatch::new(subscriber))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let ctx = log_context(cli.verbose());

    let outcome = match cli.command {
        Commands::Infer(args) => infer(args, &ctx),
        Commands::Train(args) => train(args, &ctx),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ctx.scope(|| error!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn infer(args: InferArgs, ctx: &RunContext) -> Result<()> {
    let common = args.common;
    let batch_size = validate_batch_size(common.batch_size)?;

    let mut config = InferenceConfig::new(&args.sequence_file)
        .with_format(common.format)
        .with_architecture(common.architecture)
        .with_database(common.database, common.tax)
        .with_device(common.device)
        .with_batch_size(batch_size)
        .with_num_workers(common.num_workers)
        .with_confidence_threshold(args.confidence_threshold)
        .with_output_format(args.outformat);
    if let Some(weights) = args.weights {
        config = config.with_weights(weights);
    }

    let resolver = match args.data_dir {
        Some(root) => WeightsResolver::new(root),
        None => WeightsResolver::from_env(),
    };

    let table = deepnog::run_inference(&config, &ArchitectureRegistry::new(), &resolver, ctx)
        .with_context(|| format!("inference on {} failed", args.sequence_file.display()))?;

    let sink = OutputSink::resolve(args.out.as_deref());
    sink.write_all(&table).context("could not write predictions")?;
    Ok(())
}

fn train(args: TrainArgs, ctx: &RunContext) -> Result<()> {
    let common = args.common;
    let batch_size = validate_batch_size(common.batch_size)?;
    let n_epochs = validate_epoch_count(args.n_epochs)?;

    let config = TrainingConfig::new()
        .with_architecture(common.architecture)
        .with_format(common.format)
        .with_device(common.device)
        .with_batch_size(batch_size)
        .with_epochs(n_epochs)
        .with_learning_rate(args.learning_rate)
        .with_gamma(args.gamma)
        .with_seed(args.seed)
        .with_shuffle(!args.no_shuffle)
        .with_num_workers(common.num_workers);
    let inputs =
        TrainingInputs::new(args.training_file, args.labels_file).with_validation(args.validation_file);

    let mut suffixes = RandomSuffix::new();
    let output = OutputSpec {
        dir: &args.out,
        database: &common.database,
        level: &common.tax,
        suffixes: &mut suffixes,
    };

    let (result, paths) =
        deepnog::trainer::train_and_save(&inputs, &config, &ArchitectureRegistry::new(), output, ctx)
            .context("training failed")?;

    ctx.scope(|| {
        if let Some(last) = result.final_validation() {
            info!(accuracy = last.accuracy, loss = last.loss, "final validation");
        }
        info!(
            model = %paths.model.display(),
            metrics = %paths.metrics.display(),
            labels = %paths.labels.display(),
            "training complete"
        );
    });
    Ok(())
}
