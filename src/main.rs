use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use txclass::args::{Args, CacheSubcommand, Command};
use txclass::{commands, Config, Mode, Result, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");

    // This allows for running the program without calling the classification service. When
    // TXCLASS_IN_TEST_MODE is set and non-zero in length, then the mode will be Mode::Test,
    // otherwise it will be Mode::Live.
    let mode = Mode::from_env();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Classify(classify_args) => {
            let config = Config::load(classify_args, mode).await?;
            commands::classify(config).await?.print()
        }

        Command::Categories(categories_args) => {
            let settings = Settings::load_or_default(categories_args.config()).await?;
            commands::categories(&settings)?.print()
        }

        Command::Cache(cache_args) => match cache_args.action() {
            CacheSubcommand::Stats(stats_args) => {
                let settings = Settings::load_or_default(stats_args.config()).await?;
                commands::cache_stats(stats_args.cache(), &settings.categories()?)
                    .await?
                    .print()
            }
            CacheSubcommand::Prune(prune_args) => {
                commands::cache_prune(prune_args.cache(), prune_args.below())
                    .await?
                    .print()
            }
        },
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
