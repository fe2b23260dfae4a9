use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use feedforward_nn::data::csv::{normalize_rows, read_labels, read_matrix, write_labels};
use feedforward_nn::data::{stratified_split, Batch};
use feedforward_nn::tuning::{ConfigTester, Configuration};
use feedforward_nn::{Network, RunConfig};

/// Train and evaluate dense feed-forward classifiers from CSV data.
#[derive(Parser, Debug)]
#[command(name = "feedforward-nn", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train one network and evaluate it on the test set
    Train(TrainArgs),

    /// Compare several hyperparameter configurations on the same data
    Sweep(SweepArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Run configuration (JSON)
    #[arg(long, short)]
    config: PathBuf,

    /// Overrides the worker count from the config file
    #[arg(long)]
    workers: Option<usize>,

    /// Overrides the shuffling and initialization seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// Run configuration (JSON); supplies the data files and the split
    #[arg(long, short)]
    config: PathBuf,

    /// JSON array of configurations to compare
    #[arg(long)]
    configurations: PathBuf,

    /// Trainings per configuration
    #[arg(long, default_value_t = 3)]
    runs: usize,

    /// Train each configuration once, all of them at the same time
    #[arg(long)]
    parallel: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("feedforward_nn=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Train(args) => train(args),
        Commands::Sweep(args) => sweep(args),
    }
}

fn load_batch(vectors: &Path, labels: &Path, normalize: bool) -> Result<Batch> {
    let mut data = read_matrix(vectors).with_context(|| format!("reading {}", vectors.display()))?;
    if normalize {
        normalize_rows(&mut data);
    }
    let labels = read_labels(labels).with_context(|| format!("reading {}", labels.display()))?;
    Ok(Batch::new(data, labels)?)
}

fn load_test(config: &RunConfig) -> Result<Option<Batch>> {
    match (&config.data.test_vectors, &config.data.test_labels) {
        (Some(v), Some(l)) => Ok(Some(load_batch(v, l, config.normalize)?)),
        _ => Ok(None),
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let mut config = RunConfig::load_json(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.seed.is_some() {
        config.train.seed = args.seed;
    }

    let mut rng = match config.train.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let all = load_batch(&config.data.train_vectors, &config.data.train_labels, config.normalize)?;
    let split = stratified_split(&all.data, &all.labels, config.train_ratio, &mut rng)?;
    info!(train = split.train.len(), validation = split.validation.len(), "data loaded");

    let mut network = Network::with_rng(
        config.topology.clone(),
        config.optimizer.build(),
        config.workers,
        &mut rng,
    )?;
    let mut scheduler = config
        .scheduler
        .map(|s| s.build(config.train.eta))
        .transpose()?;

    let report = network.fit(&split, &config.train, scheduler.as_mut())?;
    info!(
        epochs = report.epochs_run,
        stop = ?report.stop_reason,
        best_val_loss = ?report.best_val_loss,
        "training finished"
    );

    if let Some(test) = load_test(&config)? {
        if let Some(stats) = network.evaluate(&test)? {
            info!(accuracy = stats.accuracy, cross_entropy = stats.cross_entropy, "test set");
        }
        if let Some(path) = &config.data.predictions {
            let classes = network.predict_classes(&test.data)?;
            write_labels(path, &classes).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), rows = classes.len(), "predictions written");
        }
    }

    Ok(())
}

fn sweep(args: SweepArgs) -> Result<()> {
    let config = RunConfig::load_json(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let file = std::fs::File::open(&args.configurations)
        .with_context(|| format!("opening {}", args.configurations.display()))?;
    let configurations: Vec<Configuration> = serde_json::from_reader(std::io::BufReader::new(file))?;

    let mut rng = match config.train.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let all = load_batch(&config.data.train_vectors, &config.data.train_labels, config.normalize)?;
    let split = stratified_split(&all.data, &all.labels, config.train_ratio, &mut rng)?;
    let test = load_test(&config)?.unwrap_or_else(|| split.validation.clone());

    let mut tester = ConfigTester::new(
        &split,
        &test,
        config.topology.input_size(),
        config.topology.output_size(),
    )
    .with_workers(config.workers);
    if let Some(seed) = config.train.seed {
        tester = tester.with_seed(seed);
    }

    let json = if args.parallel {
        serde_json::to_string_pretty(&tester.run_parallel(&configurations)?)?
    } else {
        serde_json::to_string_pretty(&tester.test_configs(&configurations, args.runs)?)?
    };
    println!("{json}");
    Ok(())
}
