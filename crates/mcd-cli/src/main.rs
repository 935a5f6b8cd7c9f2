use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use mcd_schemas::TradeOrigin;

mod commands;

use commands::Ctx;

#[derive(Parser)]
#[command(name = "mcd")]
#[command(about = "MicroCap Desk portfolio engine", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> local overrides)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    /// Override engine.data_dir
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new portfolio in the data directory
    Init {
        /// Starting cash (defaults to engine.initial_cash)
        #[arg(long)]
        cash: Option<String>,

        /// Replace an existing portfolio and clear its history
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Check a portfolio CSV file
    Validate {
        path: String,
    },

    /// Execute a batch of proposed trades and commit the result
    Process {
        /// JSON file: an array of trades or {"trades": [...]}
        #[arg(long)]
        trades: String,

        /// As-of date (YYYY-MM-DD); today when omitted
        #[arg(long)]
        date: Option<String>,

        /// Origin for proposals that do not carry one
        #[arg(long, value_enum, default_value_t = OriginArg::Manual)]
        origin: OriginArg,

        /// Run the batch without writing anything
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Value the portfolio and print the daily report
    Snapshot {
        #[arg(long)]
        date: Option<String>,

        /// Append to the equity history and refresh portfolio valuation columns
        #[arg(long, default_value_t = false)]
        record: bool,
    },

    /// Print the trade log
    Log {
        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,
    },

    /// Normalized portfolio vs benchmark performance
    Performance {
        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        /// Baseline value (defaults to performance.baseline_equity)
        #[arg(long)]
        baseline: Option<String>,
    },

    /// Count buys and sells in a pending batch file
    Summary {
        #[arg(long)]
        trades: String,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OriginArg {
    Manual,
    Suggested,
}

impl From<OriginArg> for TradeOrigin {
    fn from(o: OriginArg) -> Self {
        match o {
            OriginArg::Manual => TradeOrigin::Manual,
            OriginArg::Suggested => TradeOrigin::Suggested,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let ctx = || Ctx::load(&cli.config_paths, cli.data_dir.as_deref());

    match cli.cmd {
        Commands::Init { cash, force } => commands::portfolio::init(&ctx()?, cash.as_deref(), force)?,

        Commands::Validate { path } => commands::portfolio::validate(&path)?,

        Commands::Process {
            trades,
            date,
            origin,
            dry_run,
        } => commands::portfolio::process(&ctx()?, &trades, date.as_deref(), origin.into(), dry_run).await?,

        Commands::Snapshot { date, record } => commands::accounting::snapshot(&ctx()?, date.as_deref(), record).await?,

        Commands::Log { from, to } => commands::portfolio::log(&ctx()?, from.as_deref(), to.as_deref())?,

        Commands::Performance { from, to, baseline } => {
            commands::accounting::performance(&ctx()?, from.as_deref(), to.as_deref(), baseline.as_deref())?
        }

        Commands::Summary { trades } => commands::portfolio::summary(&trades)?,

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            let loaded = mcd_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
}
