//! Gatehouse CLI - edge guard entrypoint
//!
//! Runs the guarding proxy in front of a static site or HTTP upstream, and
//! offers one-shot reputation lookups for troubleshooting.

mod commands;

use clap::{Parser, Subcommand};
use commands::{LookupCommand, ProxyCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "GATEHOUSE_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "GATEHOUSE_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the guarding proxy
    Proxy(ProxyCommand),
    /// Look up one address and print the decision it would receive
    Lookup(LookupCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.clone();

    // If RUST_LOG is set, use it directly; otherwise use our default filter
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e))?
    } else {
        // Gatehouse crates at the requested level, noisy dependencies at warn
        tracing_subscriber::EnvFilter::new(format!(
            "gatehouse={level},\
             gatehouse_cli={level},\
             gatehouse_core={level},\
             gatehouse_geo={level},\
             gatehouse_proxy={level},\
             tower_http={level},\
             h2=warn,\
             tower=warn,\
             hyper=warn,\
             reqwest=warn",
            level = log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global default subscriber: {}", e))?;

    // Commands are synchronous and own their runtime
    match cli.command {
        Commands::Proxy(proxy_cmd) => proxy_cmd.execute(),
        Commands::Lookup(lookup_cmd) => lookup_cmd.execute(),
    }
}
