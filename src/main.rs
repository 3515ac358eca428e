use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use corebench::bench::progress::ChannelSink;
use corebench::bench::{CorePlacement, StressTest};
use corebench::config::{BenchmarkConfig, BenchmarkKind, ConfigManager};
use corebench::error::user_friendly_message;
use corebench::models::{BenchmarkRecord, Category, RunResult, ScoreBoard};
use corebench::util::{
    calculate_throughput_mbps, format_bytes, format_duration, format_score, format_throughput, parse_bytes,
    parse_cores,
};
use corebench::{workloads, ClaimMode, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Progress bar resolution
const BAR_STEPS: u64 = 1000;

#[derive(Parser, Debug)]
#[command(name = "corebench", version)]
#[command(about = "Multi-core CPU, memory and disk benchmark", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one or more benchmarks
    Run {
        /// Benchmarks to run (e.g. crypto-multi ram-read disk-seq-write)
        #[arg(required = true, value_name = "KIND", value_parser = parse_kind)]
        kinds: Vec<BenchmarkKind>,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// Run the full suite
    All {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Show saved results
    History {
        /// Number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Delete all saved results
        #[arg(long)]
        clear: bool,
    },
    /// Load every core until the time runs out or Ctrl-C
    Stress {
        /// Duration in seconds
        #[arg(short, long, default_value_t = 30)]
        seconds: u64,

        /// Worker threads (default: all hardware threads)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Show or save the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Apply overrides and write the configuration file
    Save {
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Args, Debug, Default)]
struct Overrides {
    /// Worker threads for multi-core benchmarks
    #[arg(short, long)]
    workers: Option<usize>,

    /// Cores to pin workers to, e.g. 4,5,6,7 or 4-7
    #[arg(long)]
    cores: Option<String>,

    /// Chunk assignment: static or dynamic
    #[arg(long, value_parser = parse_mode)]
    mode: Option<ClaimMode>,

    /// Number of tasks the work is split into
    #[arg(long)]
    tasks: Option<usize>,

    /// Buffer size for crypto and RAM runs (e.g. 256MiB)
    #[arg(long, value_parser = parse_size)]
    size: Option<u64>,

    /// Test file size for disk runs (e.g. 1GiB)
    #[arg(long, value_parser = parse_size)]
    file_size: Option<u64>,

    /// AES-CTR passes
    #[arg(long)]
    passes: Option<u32>,

    /// Math iterations
    #[arg(long)]
    iterations: Option<u64>,

    /// Directory for the disk test file
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Do not save results to the history
    #[arg(long)]
    no_save: bool,
}

impl Overrides {
    fn apply(&self, mut config: BenchmarkConfig) -> Result<BenchmarkConfig> {
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(cores) = &self.cores {
            config = config.with_cores(parse_cores(cores)?);
        }
        if let Some(mode) = self.mode {
            config = config.with_claim_mode(mode);
        }
        if let Some(tasks) = self.tasks {
            config = config.with_num_tasks(tasks);
        }
        if let Some(size) = self.size {
            config = config.with_crypto_size(size).with_memory_size(size);
        }
        if let Some(file_size) = self.file_size {
            config = config.with_disk_file_size(file_size);
        }
        if let Some(passes) = self.passes {
            config = config.with_crypto_passes(passes);
        }
        if let Some(iterations) = self.iterations {
            config = config.with_math_iterations(iterations);
        }
        if let Some(dir) = &self.dir {
            config = config.with_disk_dir(dir.clone());
        }
        Ok(config)
    }
}

fn parse_kind(s: &str) -> std::result::Result<BenchmarkKind, String> {
    s.parse().map_err(|e: corebench::BenchError| e.to_string())
}

fn parse_mode(s: &str) -> std::result::Result<ClaimMode, String> {
    s.parse().map_err(|e: corebench::BenchError| e.to_string())
}

fn parse_size(s: &str) -> std::result::Result<u64, String> {
    parse_bytes(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", user_friendly_message(&e));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "corebench=debug" } else { "corebench=info" };
    let filter = if verbose {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(command: Command) -> Result<ExitCode> {
    let manager = ConfigManager::new()?;
    match command {
        Command::Run { kinds, overrides } => run_suite(&manager, &kinds, &overrides).await,
        Command::All { overrides } => run_suite(&manager, &BenchmarkKind::ALL, &overrides).await,
        Command::History { limit, clear } => show_history(&manager, limit, clear).map(|_| ExitCode::SUCCESS),
        Command::Stress { seconds, workers } => run_stress(&manager, seconds, workers)
            .await
            .map(|_| ExitCode::SUCCESS),
        Command::Config { action } => match action {
            ConfigAction::Show => {
                let config = manager.load_config()?;
                println!("# {}", manager.config_path().display());
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigAction::Save { overrides } => {
                let config = overrides.apply(manager.load_config()?)?;
                manager.save_config(&config)?;
                println!("Saved configuration to {}", manager.config_path().display());
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

async fn run_suite(manager: &ConfigManager, kinds: &[BenchmarkKind], overrides: &Overrides) -> Result<ExitCode> {
    let config = overrides.apply(manager.load_config()?)?;
    for &kind in kinds {
        config.validate_for(kind)?;
    }

    println!(
        "{} workers, {} tasks, crypto {}, RAM {}, disk file {} in {}",
        config.worker_count(),
        config.num_tasks,
        format_bytes(config.crypto.size_bytes),
        format_bytes(config.memory.size_bytes),
        format_bytes(config.disk.file_size),
        config.disk.dir.display()
    );

    let mut board = ScoreBoard::default();
    for &kind in kinds {
        let result = run_with_progress(kind, &config).await?;
        let record = BenchmarkRecord::new(kind, result, config.workers_for(kind));
        board.record(&record);
        print_record(&record, config.bytes_for(kind));

        if !overrides.no_save {
            if let Err(e) = manager.save_record(record) {
                warn!(error = %e, "Failed to save result");
            }
        }
    }

    if kinds.len() > 1 {
        println!();
        for category in [Category::Cpu, Category::Memory, Category::Storage] {
            println!("{:<10} {:>16}", category.description(), format_score(board.category(category)));
        }
        println!("{:<10} {:>16}", "Total", format_score(board.total()));
    }

    if !board.all_ok() {
        warn!(failures = board.failures, "Some benchmarks failed");
        eprintln!("{} of {} benchmarks failed", board.failures, kinds.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Run `kind` on the blocking pool while a bar renders its progress
async fn run_with_progress(kind: BenchmarkKind, config: &BenchmarkConfig) -> Result<RunResult> {
    let (sink, mut rx) = ChannelSink::new();
    let pb = ProgressBar::new(BAR_STEPS);
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg:<32} [{bar:40}] {percent:>3}% ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(kind.description());

    let bar = pb.clone();
    let render = tokio::spawn(async move {
        while let Some(fraction) = rx.recv().await {
            bar.set_position((fraction * BAR_STEPS as f64) as u64);
        }
    });

    let run_config = config.clone();
    let result = tokio::task::spawn_blocking(move || workloads::run(kind, &run_config, &sink))
        .await
        .map_err(|e| corebench::BenchError::WorkerFatal(format!("benchmark task failed: {}", e)))?;

    render.await.ok();
    pb.finish_and_clear();
    Ok(result)
}

fn print_record(record: &BenchmarkRecord, bytes: Option<u64>) {
    if record.result.is_ok() {
        let elapsed = Duration::from_millis(record.result.duration_ms);
        let throughput = bytes
            .filter(|_| !elapsed.is_zero())
            .map(|b| format_throughput(calculate_throughput_mbps(b, elapsed)))
            .unwrap_or_default();
        println!(
            "{:<36} {:>10}  score {:>14}  {}",
            record.kind.description(),
            format_duration(elapsed),
            format_score(record.score.value),
            throughput
        );
    } else {
        println!(
            "{:<36} {:>10}  ({})",
            record.kind.description(),
            "FAILED",
            record.result.status
        );
    }
}

fn show_history(manager: &ConfigManager, limit: usize, clear: bool) -> Result<()> {
    if clear {
        let count = manager.record_count()?;
        manager.clear_history()?;
        println!("Deleted {} saved results.", count);
        return Ok(());
    }

    let records = manager.recent_records(limit)?;
    if records.is_empty() {
        println!("No saved results.");
        return Ok(());
    }
    for record in &records {
        println!("{}", record.summary());
    }
    println!("Showing {} of {} saved results.", records.len(), manager.record_count()?);
    Ok(())
}

async fn run_stress(manager: &ConfigManager, seconds: u64, workers: Option<usize>) -> Result<()> {
    let mut config = manager.load_config()?;
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }
    config.validate_for(BenchmarkKind::MathMulti)?;

    let workers = config.worker_count();
    let placement: Arc<dyn CorePlacement> = Arc::from(config.placement(BenchmarkKind::MathMulti));
    let handle = StressTest::start(workers, placement)?;

    let pb = ProgressBar::new(seconds);
    pb.set_style(
        ProgressStyle::with_template("{spinner} stress [{bar:40}] {pos}/{len}s {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    for elapsed in 1..=seconds {
        tokio::select! {
            _ = ticker.tick() => {
                pb.set_position(elapsed);
                pb.set_message(format!("{} iterations", format_score(handle.iterations())));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    pb.finish_and_clear();

    let iterations = handle.stop()?;
    println!("Stress test: {} workers, {} iterations", workers, format_score(iterations));
    Ok(())
}
