//! SweepLab CLI — version management and pipeline stage commands.
//!
//! Commands:
//! - `version new|list|current|use` — manage experiment versions
//! - `generate` — write parameter sets for a strategy into the current version
//! - `signals` / `performance` / `select` — one batch stage for a sample window
//! - `live` — today's decisions for every out-of-sample selection
//! - `simulate` — advance the virtual accounts by one day
//! - `run` — the whole pipeline from a TOML config file

use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sweeplab_core::data::CsvPriceSource;
use sweeplab_core::domain::{
    normalize_symbol, parse_date, DateRange, DateRangeError, StrategyKind, VersionId,
};
use sweeplab_runner::{
    evaluate_performance, evaluate_signals, generate_live_signals, generate_params, run_pipeline,
    select_strategies, simulate_accounts, ArtifactStore, GenerationMode, GeneratorSpec,
    PipelineConfig, RankField, SampleWindow, SelectionConfig, SelectionCriteria, SortDirection,
    StageReport, TaskScheduler, Thresholds, VersionStore, DEFAULT_INITIAL_CAPITAL,
    DEFAULT_LIVE_WINDOW, DEFAULT_MAX_WORKERS,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sweeplab",
    about = "SweepLab CLI — parameter sweeps, selection and account simulation"
)]
struct Cli {
    /// Artifact root holding version metadata and every stage directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Directory of `{symbol}.csv` daily price files.
    #[arg(long, global = true, default_value = "data_csv")]
    data_dir: PathBuf,

    /// Operate on this version instead of the current one.
    #[arg(long = "use-version", global = true)]
    use_version: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Experiment version management.
    Version {
        #[command(subcommand)]
        action: VersionAction,
    },
    /// Generate parameter sets into the in-sample parameter store.
    Generate {
        #[arg(long)]
        strategy: StrategyKind,

        #[command(flatten)]
        symbols: SymbolArgs,

        /// Number of parameter sets per symbol (0 keeps the full grid).
        #[arg(long, default_value_t = 100)]
        count: usize,

        #[arg(long, value_enum, default_value_t = ModeArg::Grid)]
        mode: ModeArg,

        /// Master seed for random mode; omitted means OS entropy.
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
        workers: usize,
    },
    /// Evaluate batch signals for every logged parameter set.
    Signals {
        #[arg(long)]
        strategy: StrategyKind,

        #[command(flatten)]
        symbols: SymbolArgs,

        /// Sample window: in or out.
        #[arg(long)]
        window: SampleWindow,

        /// Start date (YYYY-MM-DD).
        #[arg(long, value_parser = start_date)]
        start: NaiveDate,

        /// End date (YYYY-MM-DD).
        #[arg(long, value_parser = end_date)]
        end: NaiveDate,

        #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
        workers: usize,
    },
    /// Compute performance metrics from a signal table.
    Performance {
        #[arg(long)]
        strategy: StrategyKind,

        #[command(flatten)]
        symbols: SymbolArgs,

        #[arg(long)]
        window: SampleWindow,

        #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
        workers: usize,
    },
    /// Rank a performance table and keep the top N.
    Select {
        #[arg(long)]
        strategy: StrategyKind,

        #[command(flatten)]
        symbols: SymbolArgs,

        #[arg(long)]
        window: SampleWindow,

        /// total_return, max_drawdown or sharpe.
        #[arg(long, default_value = "sharpe")]
        rank_field: RankField,

        /// Defaults to descending, or ascending (toward zero) for max_drawdown.
        #[arg(long)]
        direction: Option<SortDirection>,

        #[arg(long, default_value_t = 10)]
        top_n: usize,

        #[arg(long)]
        min_sharpe: Option<f64>,

        /// Largest allowed drawdown magnitude (e.g. 0.2).
        #[arg(long)]
        max_drawdown: Option<f64>,

        #[arg(long)]
        min_total_return: Option<f64>,

        /// Do not copy in-sample survivors into the out-of-sample parameter store.
        #[arg(long, default_value_t = false)]
        no_promote: bool,
    },
    /// Evaluate out-of-sample selections live and write the day's decisions.
    Live {
        /// Strategy kinds to include (defaults to all).
        #[arg(long, num_args = 1..)]
        strategies: Vec<StrategyKind>,

        #[command(flatten)]
        symbols: SymbolArgs,

        /// Simulated date (YYYY-MM-DD).
        #[arg(long, value_parser = as_of_date)]
        as_of: NaiveDate,

        /// Trailing bars to evaluate.
        #[arg(long, default_value_t = DEFAULT_LIVE_WINDOW)]
        window: usize,

        #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
        workers: usize,
    },
    /// Advance the account snapshots by the decisions of one day.
    Simulate {
        #[arg(long, value_parser = as_of_date)]
        as_of: NaiveDate,

        #[arg(long, default_value_t = DEFAULT_INITIAL_CAPITAL)]
        initial_capital: f64,
    },
    /// Run every stage from a TOML pipeline config.
    Run {
        #[arg(long)]
        config: PathBuf,

        /// Create a fresh version for this run.
        #[arg(long, default_value_t = false)]
        new_version: bool,
    },
}

#[derive(Subcommand)]
enum VersionAction {
    /// Create a version and make it current.
    New {
        #[arg(long)]
        description: Option<String>,
    },
    /// List every version, oldest first.
    List,
    /// Print the current version.
    Current,
    /// Make an existing version current.
    Use { id: String },
}

#[derive(Args)]
struct SymbolArgs {
    /// Symbols to process (e.g. AAPL MSFT); trimmed, upper-cased and deduplicated.
    #[arg(long, num_args = 1.., required = true, value_parser = normalize_symbol)]
    symbols: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Grid,
    Random,
}

impl From<ModeArg> for GenerationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Grid => GenerationMode::Grid,
            ModeArg::Random => GenerationMode::Random,
        }
    }
}

fn start_date(s: &str) -> Result<NaiveDate, DateRangeError> {
    parse_date("start", s)
}

fn end_date(s: &str) -> Result<NaiveDate, DateRangeError> {
    parse_date("end", s)
}

fn as_of_date(s: &str) -> Result<NaiveDate, DateRangeError> {
    parse_date("as_of", s)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let versions = VersionStore::open(&cli.root)?;

    let source = CsvPriceSource::new(&cli.data_dir);

    match cli.command {
        Commands::Version { action } => run_version(&versions, &action),
        Commands::Generate {
            strategy,
            symbols,
            count,
            mode,
            seed,
            workers,
        } => {
            let store = open_store(&versions, cli.use_version.as_deref())?;
            let mut spec = GeneratorSpec::default_for(strategy);
            spec.count = count;
            spec.mode = mode.into();
            spec.seed = seed;
            let report = generate_params(&store, &spec, &symbols.symbols, &TaskScheduler::new(workers))?;
            print_reports(&[report])
        }
        Commands::Signals {
            strategy,
            symbols,
            window,
            start,
            end,
            workers,
        } => {
            let store = open_store(&versions, cli.use_version.as_deref())?;
            let range = DateRange::new(start, end)?;
            let report = evaluate_signals(
                &store,
                &source,
                strategy,
                &symbols.symbols,
                window,
                &range,
                &TaskScheduler::new(workers),
            )?;
            print_reports(&[report])
        }
        Commands::Performance {
            strategy,
            symbols,
            window,
            workers,
        } => {
            let store = open_store(&versions, cli.use_version.as_deref())?;
            let report = evaluate_performance(
                &store,
                strategy,
                &symbols.symbols,
                window,
                &TaskScheduler::new(workers),
            )?;
            print_reports(&[report])
        }
        Commands::Select {
            strategy,
            symbols,
            window,
            rank_field,
            direction,
            top_n,
            min_sharpe,
            max_drawdown,
            min_total_return,
            no_promote,
        } => {
            let store = open_store(&versions, cli.use_version.as_deref())?;
            let config = SelectionConfig {
                criteria: SelectionCriteria {
                    rank_field,
                    direction,
                    top_n,
                    thresholds: Thresholds {
                        min_sharpe,
                        max_drawdown,
                        min_total_return,
                    },
                },
                promote: !no_promote,
            };
            let report = select_strategies(&store, strategy, &symbols.symbols, window, &config)?;
            print_reports(&[report])
        }
        Commands::Live {
            strategies,
            symbols,
            as_of,
            window,
            workers,
        } => {
            let store = open_store(&versions, cli.use_version.as_deref())?;
            let strategies = if strategies.is_empty() {
                StrategyKind::ALL.to_vec()
            } else {
                strategies
            };
            let report = generate_live_signals(
                &store,
                &source,
                &strategies,
                &symbols.symbols,
                as_of,
                window,
                &TaskScheduler::new(workers),
            )?;
            print_reports(&[report])
        }
        Commands::Simulate {
            as_of,
            initial_capital,
        } => {
            if !(initial_capital.is_finite() && initial_capital > 0.0) {
                bail!("--initial-capital must be positive");
            }
            let store = open_store(&versions, cli.use_version.as_deref())?;
            let report = simulate_accounts(&store, as_of, initial_capital)?;
            print_reports(&[report])
        }
        Commands::Run {
            config,
            new_version,
        } => {
            let path = config;
            let config = PipelineConfig::from_file(&path)?;
            if new_version {
                versions.create_version(Some("pipeline run"))?;
            }
            let store = open_store(&versions, cli.use_version.as_deref())?;
            info!(config = %path.display(), version = %store.context().version(), "pipeline run");
            println!("Version: {}", store.context().version());
            let reports = run_pipeline(&store, &source, &config)?;
            print_reports(&reports)
        }
    }
}

fn run_version(versions: &VersionStore, action: &VersionAction) -> Result<()> {
    match action {
        VersionAction::New { description } => {
            let id = versions.create_version(description.as_deref())?;
            println!("Created version {id}");
        }
        VersionAction::List => {
            let current = versions.current_version();
            let list = versions.list_versions();
            if list.is_empty() {
                println!("No versions yet. Create one with `sweeplab version new`.");
            }
            for info in list {
                let marker = if Some(&info.version_id) == current.as_ref() {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} {}  {}  {}",
                    info.version_id,
                    info.created_at.format("%Y-%m-%d %H:%M:%S"),
                    info.description
                );
            }
        }
        VersionAction::Current => match versions.current_version() {
            Some(id) => println!("{id}"),
            None => bail!("no current version; create one with `sweeplab version new`"),
        },
        VersionAction::Use { id } => {
            let id = VersionId::new(id.as_str());
            versions.set_current_version(&id)?;
            println!("Current version: {id}");
        }
    }
    Ok(())
}

fn open_store(versions: &VersionStore, explicit: Option<&str>) -> Result<ArtifactStore> {
    let ctx = match explicit {
        Some(id) => versions.context(&VersionId::new(id))?,
        None => versions.current_context()?,
    };
    Ok(ArtifactStore::new(ctx))
}

fn print_reports(reports: &[StageReport]) -> Result<()> {
    let mut failed = 0;
    for report in reports {
        print!("{report}");
        failed += report.failures.len();
    }
    if failed > 0 {
        println!("{failed} unit(s) failed; see the list above.");
    }
    Ok(())
}
