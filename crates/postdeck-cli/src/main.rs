//! `postdeck`: command line client for the dashboard backend.
//!
//! ```text
//! postdeck watch --url wss://api.example.com/ws/chat/ --token $TOKEN
//! postdeck validate --token $TOKEN
//! postdeck workflow --status pending --role client
//! ```

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use postdeck_client::{ChatFeed, ChatFeedEvent, ClientConfig, TokenValidator};
use postdeck_core::{Post, PostStatus, Role, determine_update_status, workflow_status};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "postdeck", version, about = "Dashboard backend client")]
struct Cli {
    /// TOML config file.
    #[arg(long, env = "POSTDECK_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print chat feed events as JSON lines until interrupted.
    Watch {
        /// Chat socket URL; defaults to `connection.url` from the config.
        #[arg(long, env = "POSTDECK_WS_URL")]
        url: Option<String>,
        #[arg(long, env = "POSTDECK_TOKEN")]
        token: Option<String>,
        /// Only print events for this room.
        #[arg(long)]
        room: Option<String>,
    },
    /// Validate a bearer token and print the user and role.
    Validate {
        #[arg(long, env = "POSTDECK_TOKEN")]
        token: String,
        /// REST API base; defaults to `auth.api_base` from the config.
        #[arg(long, env = "POSTDECK_API_BASE")]
        api_base: Option<String>,
    },
    /// Show what a role can do with a post in a given status.
    Workflow {
        #[arg(long)]
        status: String,
        #[arg(long)]
        role: String,
        #[arg(long, default_value_t = 0)]
        id: u64,
        #[arg(long)]
        client_approved: bool,
        #[arg(long)]
        moderator_rejected: bool,
        /// RFC 3339 timestamp.
        #[arg(long)]
        scheduled_for: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("postdeck=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    match cli.command {
        Command::Watch { url, token, room } => {
            watch(&config, url, token, room).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { token, api_base } => validate(&config, &token, api_base).await,
        Command::Workflow {
            status,
            role,
            id,
            client_approved,
            moderator_rejected,
            scheduled_for,
        } => {
            let mut post = Post::new(id, PostStatus::from(status.as_str()));
            post.is_client_approved = client_approved;
            post.is_moderator_rejected = moderator_rejected;
            post.scheduled_for = scheduled_for;
            let report = workflow_report(&post, Role::from(role.as_str()));
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn watch(
    config: &ClientConfig,
    url: Option<String>,
    token: Option<String>,
    room: Option<String>,
) -> anyhow::Result<()> {
    let base = url.unwrap_or_else(|| config.connection.url.clone());
    let endpoint = ChatFeed::endpoint(&base, token.as_deref())?;
    tracing::info!("Watching {}", base);

    let mut feed = ChatFeed::connect(
        endpoint,
        config.connection.protocols.clone(),
        config.connection.reconnect_options(),
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = feed.next() => match event {
                Some(ChatFeedEvent::Connected) => tracing::info!("Connected"),
                Some(ChatFeedEvent::Disconnected(close)) => {
                    tracing::info!("Disconnected: {} {}", close.code, close.reason);
                }
                Some(ChatFeedEvent::Event(event)) => {
                    let wanted = match (&room, event.room_id()) {
                        (None, _) => true,
                        (Some(room), Some(id)) => id.to_string() == *room,
                        (Some(_), None) => false,
                    };
                    if wanted {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                }
                None => {
                    let state = feed.socket().state();
                    return match state.last_error {
                        Some(e) => Err(anyhow::anyhow!("chat feed closed: {e}")),
                        None => Ok(()),
                    };
                }
            },
            result = &mut shutdown => {
                result.context("failed to listen for ctrl-c")?;
                tracing::info!("Interrupted, closing");
                feed.close().await;
                return Ok(());
            }
        }
    }
}

async fn validate(
    config: &ClientConfig,
    token: &str,
    api_base: Option<String>,
) -> anyhow::Result<ExitCode> {
    let api_base = api_base.unwrap_or_else(|| config.auth.api_base.clone());
    let cache = Arc::new(config.auth.cache());
    let validator = TokenValidator::new(&api_base, cache)?;

    let result = validator.validate(token).await;
    let role = result.role();
    let valid = result.is_valid;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "result": result, "role": role }))?
    );

    Ok(if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn workflow_report(post: &Post, role: Role) -> serde_json::Value {
    json!({
        "status": post.status,
        "role": role,
        "next_status": determine_update_status(post, role),
        "actions": workflow_status(post, role),
    })
}
