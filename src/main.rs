use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use homedir::my_home;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cortex::app::{App, AppError, Request, Response};
use cortex::cli::{self, Command, RulesArgs, SettingsArgs};
use cortex::config::Config;

const DEFAULT_LOG_FILTER: &str = "cortex=info,tower_http=info";

fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("CORTEX_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .ok()
        .flatten()
        .context("could not determine home directory, set CORTEX_BASE_PATH")?;
    Ok(home.join(".local/share/cortex"))
}

fn print_response(response: Response) -> anyhow::Result<()> {
    if !response.success {
        bail!(response.error.unwrap_or_else(|| "request failed".to_string()));
    }

    let data = response.data.unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

/// Commands that read current state before building their request.
async fn stateful_request(app: &App, command: Command) -> Result<Option<Request>, AppError> {
    match command {
        Command::Settings {
            action: SettingsArgs::Update { update },
        } => {
            if update.is_empty() {
                println!("This update request does nothing");
                return Ok(None);
            }
            let mut settings = app.store().get_settings().await?;
            update.apply(&mut settings);
            Ok(Some(Request::UpdateSettings { settings }))
        }

        Command::Rule {
            action: RulesArgs::Update { id, value, status },
        } => {
            let rule = app
                .store()
                .list_privacy_rules()
                .await?
                .into_iter()
                .find(|rule| rule.id == id)
                .ok_or_else(|| AppError::NotFound(format!("privacy rule {id}")))?;
            Ok(Some(Request::UpdatePrivacyRule {
                rule: cli::update_rule(rule, value, status),
            }))
        }

        _ => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Args::parse();
    let config = Config::load_with(&base_path()?)?;
    let app = App::start(config);

    if let Command::Daemon {} = args.command {
        return cortex::web::start_app(app).await;
    }

    // one-shot commands see the full index, the daemon loads it in the background
    app.store().wait_hydrated().await;

    let is_capture = matches!(args.command, Command::Capture { .. });
    let needs_state = matches!(
        args.command,
        Command::Settings {
            action: SettingsArgs::Update { .. }
        } | Command::Rule {
            action: RulesArgs::Update { .. }
        }
    );

    let request = if needs_state {
        stateful_request(&app, args.command).await?
    } else {
        args.command.into_request()?
    };

    let result = match request {
        Some(request) => {
            let response = app.dispatch(request).await;
            if is_capture {
                app.flush().await?;
            }
            print_response(response)
        }
        None => Ok(()),
    };

    app.shutdown().await?;
    result
}
