//! Xerobot main binary.

mod compose;
mod config;
mod generator;
mod jobs;
mod runtime;
mod scheduler;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "xerobot", version, about = "Xerobot crypto social bot")]
struct Cli {
    /// Config file (default: ~/.xerobot/config.toml).
    #[arg(long, global = true, env = "XEROBOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every enabled job on its schedule until Ctrl-C (default).
    Serve,
    /// Run one job once and print its outcome.
    Run {
        #[arg(value_enum)]
        job: jobs::JobKind,
    },
    /// Validate config and show the cursor and upcoming runs.
    Doctor,
    /// Print the durable mention cursor.
    Cursor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing()?;
    install_panic_hook();
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let cli = Cli::parse();

    let command = if let Some(command) = cli.command {
        command
    } else {
        Command::Serve
    };

    match command {
        Command::Serve => runtime::serve(cli.config).await,
        Command::Run { job } => runtime::run_once(cli.config, job).await,
        Command::Doctor => runtime::doctor(cli.config).await,
        Command::Cursor => runtime::show_cursor(cli.config).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new(
            "info,xerobot=debug,xero_core=debug,xero_social=debug,xero_llm=debug,xero_feeds=debug",
        ),
    };
    let log_format = std::env::var("XEROBOT_LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported XEROBOT_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::info!(
        log_format = %log_format,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_serve_and_parses_job_names() {
        let cli = Cli::try_parse_from(["xerobot"]).expect("no args");
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["xerobot", "--config", "/etc/xerobot.toml", "run", "top_gainers"])
            .expect("run args");
        assert_eq!(cli.config, Some(PathBuf::from("/etc/xerobot.toml")));
        assert!(matches!(
            cli.command,
            Some(Command::Run {
                job: jobs::JobKind::TopGainers
            })
        ));

        assert!(Cli::try_parse_from(["xerobot", "run", "weather"]).is_err());
    }

    #[test]
    fn panic_payloads_are_stringified() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_payload_to_string(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_payload_to_string(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_payload_to_string(boxed.as_ref()), "non-string panic payload");
    }
}
