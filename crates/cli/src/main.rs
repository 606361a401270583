//! Switchboard CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Write a starter config
//! - `gateway`: Start the HTTP routing API
//! - `route`: Decide where one visitor's chat would go
//! - `rule`: Show the rule governing the widget on a page
//! - `reclaim`: Terminate stale call sessions once
//! - `status`: Show configuration summary
//! - `doctor`: Diagnose configuration problems

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "switchboard",
    about = "Switchboard: live-chat routing for operator teams",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "SWITCHBOARD_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Onboard,

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Decide where a visitor's chat would be routed
    Route {
        /// Channel id
        channel: String,

        /// Page the visitor is on
        #[arg(long)]
        url: Option<String>,

        /// Visitor country code (e.g. BE)
        #[arg(long)]
        country: Option<String>,

        /// Preferred language (e.g. fr_BE)
        #[arg(long)]
        lang: Option<String>,

        /// Agent the visitor last talked to
        #[arg(long)]
        previous_agent: Option<String>,

        /// Also build the session and print it
        #[arg(long)]
        session: bool,

        /// Visitor display name, used for the session name
        #[arg(long)]
        visitor_name: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the rule that governs the widget on a page
    Rule {
        /// Channel id
        channel: String,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        country: Option<String>,
    },

    /// Terminate call sessions that stopped heartbeating
    Reclaim,

    /// Show configuration summary
    Status,

    /// Diagnose configuration problems
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Route {
            channel,
            url,
            country,
            lang,
            previous_agent,
            session,
            visitor_name,
            json,
        } => {
            let visitor = switchboard_gateway::api_v1::VisitorContext {
                url,
                country,
                lang,
                previous_agent,
                visitor_id: None,
                visitor_name,
            };
            commands::route::run(channel, visitor, session, json).await?
        }
        Commands::Rule {
            channel,
            url,
            country,
        } => commands::rule::run(channel, url, country).await?,
        Commands::Reclaim => commands::reclaim::run().await?,
        Commands::Status => commands::status::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
