use clap::Parser;
use daybook_core::error::CoreError;
use daybook_core::features::Feature;
use owo_colors::{OwoColorize, Style};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod commands;
mod config;
mod parser;
mod util;
mod views;

use app::App;
use cli::Commands;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let (config, config_error) = match config::Config::new() {
        Ok(config) => (config, None),
        Err(e) => (config::Config::default(), Some(e)),
    };
    init_tracing(&config.log_filter);
    if let Some(e) = config_error {
        warn!(error = %e, "ignoring invalid configuration, using defaults");
    }

    let app = match App::open(config).await {
        Ok(app) => app,
        Err(e) => {
            handle_error(e);
            std::process::exit(1);
        }
    };

    if let Err(e) = dispatch(&app, cli.command).await {
        handle_error(e);
        std::process::exit(1);
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(app: &App, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Task(command) => {
            app.features.require(Feature::Tasks)?;
            commands::task::run(app, command).await
        }
        Commands::Notebook(command) => {
            app.features.require(Feature::Notes)?;
            commands::note::run_notebook(app, command).await
        }
        Commands::Note(command) => {
            app.features.require(Feature::Notes)?;
            commands::note::run_note(app, command).await
        }
        Commands::Habit(command) => {
            app.features.require(Feature::Habits)?;
            commands::habit::run(app, command).await
        }
        Commands::Event(command) => {
            app.features.require(Feature::Calendar)?;
            commands::event::run(app, command).await
        }
        Commands::Activity(command) => {
            app.features.require(Feature::TimeTracking)?;
            commands::time::run_activity(app, command).await
        }
        Commands::Timer(command) => {
            app.features.require(Feature::TimeTracking)?;
            commands::time::run_timer(app, command).await
        }
        Commands::Log(command) => {
            app.features.require(Feature::TimeTracking)?;
            commands::time::run_log(app, command).await
        }
        Commands::Features(command) => commands::features::run(app, command).await,
        Commands::Sync(command) => {
            app.features.require(Feature::RemoteSync)?;
            commands::sync::run(app, command).await
        }
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.downcast_ref::<CoreError>() {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} Not found: {}", "Error:".style(error_style), s);
            }
            CoreError::AmbiguousId(candidates) => {
                eprintln!("{}", "Error: Ambiguous ID.".style(error_style));
                eprintln!("Did you mean one of these?");
                for (id, name) in candidates {
                    eprintln!("  {} ({})", id.yellow(), name);
                }
            }
            CoreError::InvalidInput(s) => {
                eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
            }
            CoreError::Duplicate(s) => {
                eprintln!("{} Already exists: {}", "Error:".style(error_style), s);
            }
            CoreError::CircularDependency(task, depends_on) => {
                eprintln!(
                    "{} Circular dependency detected: Task '{}' cannot depend on '{}'",
                    "Error:".style(error_style),
                    task.yellow(),
                    depends_on.yellow()
                );
            }
            CoreError::SchemaDowngrade { .. } => {
                eprintln!("{} {}", "Error:".style(error_style), core_error);
                eprintln!("This database was written by a newer version of daybook.");
            }
            _ => eprintln!("{} {:#}", "Error:".style(error_style), err),
        }
    } else {
        eprintln!("{} {:#}", "Error:".style(error_style), err);
    }
}
