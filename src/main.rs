use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use jobwarden::config::{Config, LoggingConfig};

#[derive(Parser)]
#[command(
    name = "jobwarden",
    about = "Cron job scheduler with run history and an HTTP control API",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (overrides JOBWARDEN_CONFIG and the system path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (scheduler + API server)
    Serve {
        /// Bind address, overrides [server] bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Inspect the configured jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Run one job now, in-process, and print its report as JSON
    Run {
        /// Job name
        job: String,
    },

    /// Count stored transactions per asset traded in a date window
    Volumes {
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: NaiveDate,

        /// Last day (inclusive), YYYY-MM-DD
        #[arg(long)]
        to: NaiveDate,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// List all jobs and their cron schedules
    List,

    /// Preview what will run in the next N hours
    DryRun {
        /// Hours to preview
        #[arg(long, default_value = "24")]
        hours: u64,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            config.validate()?;
            tracing::info!(bind = %config.server.bind, "Starting jobwarden daemon");
            jobwarden::serve(config).await?;
        }
        Commands::Jobs { action } => match action {
            JobsAction::List => {
                let jobs = jobwarden::build_jobs(&config)?;
                if jobs.is_empty() {
                    println!("No jobs configured.");
                } else {
                    println!("{:<35} | Cron", "Name");
                    println!("{:-<35}-|-{:-<15}", "", "");
                    for job in jobs {
                        println!("{:<35} | {}", job.name(), job.cron_schedule());
                    }
                }
            }
            JobsAction::DryRun { hours } => {
                let scheduler = jobwarden::build_scheduler(&config)?;
                let preview = scheduler.preview_next_runs(hours);
                if preview.is_empty() {
                    println!("No runs scheduled in next {} hours.", hours);
                } else {
                    println!("Upcoming runs (next {} hours):", hours);
                    for run in preview {
                        println!("{} : {} ({})", run.at.to_rfc3339(), run.job_name, run.cron_schedule);
                    }
                }
            }
        },
        Commands::Run { job } => {
            let scheduler = jobwarden::build_scheduler(&config)?;
            tracing::info!(%job, "Running job once");
            let report = scheduler.execute_job_now(&job).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Volumes { from, to } => {
            let repo = jobwarden::storage::SqliteDisclosureRepository::open(&config.disclosure.database_path)?;
            let volumes = repo.transaction_volumes(from, to)?;
            if volumes.is_empty() {
                println!("No transactions between {} and {}.", from, to);
            } else {
                println!("{:<50} | Transactions", "Asset");
                println!("{:-<50}-|-{:-<12}", "", "");
                for (asset, count) in volumes {
                    println!("{:<50} | {}", asset, count);
                }
            }
        }
    }

    Ok(())
}
