use meshprobe_core::campaign::{Campaign, CampaignSummary, StopReason};
use meshprobe_core::config::MeshprobeConfig;
use meshprobe_core::corpus::{Corpus, InMemoryCorpus};
use meshprobe_core::encoder::WireMessageEncoder;
use meshprobe_core::executor::{ExecutionStatus, Executor, InProcessExecutor};
use meshprobe_core::harness::HarnessContext;
use meshprobe_core::input::Input;
use meshprobe_core::loopback::{LoopbackOptions, LoopbackStack};
use meshprobe_core::message::StructuredMessage;
use meshprobe_core::mutator::{FlipSingleByteMutator, JsonFieldMutator, Mutator};
use meshprobe_core::oracle::CrashOracle;

use clap::{Parser, Subcommand, ValueEnum};
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_CONFIG_FILE: &str = "meshprobe.toml";

#[derive(Parser, Debug)]
#[clap(author, version, about = "Fuzzing harness for the secure-messaging receive path", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults to ./meshprobe.toml when present.
    #[clap(short, long, global = true, value_parser)]
    config: Option<PathBuf>,

    #[clap(long, global = true, default_value = "info")]
    log_level: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Raw,
    Structured,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an in-process campaign against the loopback stack.
    Run {
        #[clap(long, value_enum, default_value = "structured")]
        mode: Mode,
        #[clap(short, long)]
        iterations: Option<u64>,
        #[clap(long)]
        rng_seed: Option<u64>,
        /// Extra seed files or directories.
        #[clap(long)]
        seeds: Vec<PathBuf>,
        #[clap(long)]
        artifacts_dir: Option<PathBuf>,
        /// Arm the loopback stack's canary crash.
        #[clap(long)]
        canary: bool,
    },
    /// Encode a structured message (JSON text or @file) and print it as hex.
    Encode { message: String },
    /// Run one stored input through the harness.
    Replay {
        file: PathBuf,
        #[clap(long, value_enum, default_value = "raw")]
        mode: Mode,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<MeshprobeConfig, anyhow::Error> {
    let mut config = match path {
        Some(path) => {
            tracing::info!("Loading configuration from {:?}", path);
            MeshprobeConfig::load_from_file(path)?
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                tracing::info!("Loading default configuration {:?}", default_path);
                MeshprobeConfig::load_from_file(&default_path)?
            } else {
                MeshprobeConfig::default()
            }
        }
    };
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

fn loopback_context(config: &MeshprobeConfig) -> HarnessContext<LoopbackStack> {
    let stack = LoopbackStack::new(LoopbackOptions::from_settings(&config.stack));
    HarnessContext::new(config.clone(), stack)
}

fn run_campaign<I, M>(config: &MeshprobeConfig, mutator: M) -> Result<CampaignSummary<I>, anyhow::Error>
where
    I: Input,
    M: Mutator<I, ChaCha8Rng>,
{
    let mut corpus = InMemoryCorpus::<I>::new(config.corpus.max_entries);
    if config.corpus.builtin_seeds {
        corpus.add_builtin_seeds()?;
    }
    let loaded = corpus.load_initial_seeds(&config.corpus.seed_paths)?;
    tracing::info!("Corpus ready: {} entries ({} from seed paths)", corpus.len(), loaded);

    let executor = InProcessExecutor::new(loopback_context(config));
    let mut campaign = Campaign::new(corpus, mutator, executor, CrashOracle::new(), &config.campaign);
    let summary = campaign.run()?;
    campaign.executor_mut().context_mut().shutdown();
    Ok(summary)
}

fn report<I: Input>(summary: &CampaignSummary<I>) -> i32 {
    println!(
        "iterations: {}  dispatched: {}  rejected: {}  corpus: {}",
        summary.iterations, summary.dispatched, summary.rejected, summary.corpus_size
    );
    match &summary.stop_reason {
        StopReason::IterationBudget => {
            println!("Iteration budget exhausted.");
            0
        }
        StopReason::DeadlineReached { elapsed_minutes } => {
            println!("Stopping fuzzing after {elapsed_minutes} minutes");
            0
        }
        StopReason::CrashFound => {
            if let Some(bug) = &summary.bug {
                println!("CRASH {}: {}", bug.input_hash, bug.description);
            }
            if let Some(path) = &summary.artifact {
                println!("Artifact: {}", path.display());
            }
            1
        }
        StopReason::Fatal(msg) => {
            eprintln!("Harness initialization failed: {msg}");
            2
        }
    }
}

fn replay<I: Input>(config: &MeshprobeConfig, file: &Path) -> Result<i32, anyhow::Error> {
    let bytes = std::fs::read(file)
        .map_err(|e| anyhow::anyhow!("Failed to read input {:?}: {}", file, e))?;
    let input = I::from_artifact_bytes(&bytes)?;
    let mut executor = InProcessExecutor::new(loopback_context(config));
    let status = executor.execute_sync(&input);
    executor.context_mut().shutdown();

    println!("{status:?}");
    Ok(match status {
        ExecutionStatus::Ok | ExecutionStatus::Rejected | ExecutionStatus::CampaignExpired { .. } => 0,
        ExecutionStatus::Crash(_) => 1,
        ExecutionStatus::Fatal(_) => 2,
    })
}

fn parse_message_arg(arg: &str) -> Result<StructuredMessage, anyhow::Error> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read message file {:?}: {}", path, e))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("Invalid message JSON: {}", e))
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let mut config = load_config(cli.config.as_deref())?;
    tracing::debug!("Effective configuration: {config:#?}");

    let code = match cli.command {
        Command::Run {
            mode,
            iterations,
            rng_seed,
            seeds,
            artifacts_dir,
            canary,
        } => {
            if let Some(iterations) = iterations {
                config.campaign.iterations = iterations;
            }
            if let Some(seed) = rng_seed {
                config.campaign.rng_seed = seed;
            }
            if let Some(dir) = artifacts_dir {
                config.campaign.artifacts_dir = dir;
            }
            config.corpus.seed_paths.extend(seeds);
            config.stack.canary |= canary;

            match mode {
                Mode::Raw => report(&run_campaign::<Vec<u8>, _>(&config, FlipSingleByteMutator)?),
                Mode::Structured => report(&run_campaign::<StructuredMessage, _>(
                    &config,
                    JsonFieldMutator::<StructuredMessage>::default(),
                )?),
            }
        }
        Command::Encode { message } => {
            let message = parse_message_arg(&message)?;
            let encoded = WireMessageEncoder::new(config.encoder.octet_layout).encode(&message);
            println!("{}", hex::encode(encoded.as_slice()));
            0
        }
        Command::Replay { file, mode } => match mode {
            Mode::Raw => replay::<Vec<u8>>(&config, &file)?,
            Mode::Structured => replay::<StructuredMessage>(&config, &file)?,
        },
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
