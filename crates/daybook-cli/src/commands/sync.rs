use anyhow::Result;
use daybook_core::repository::TaskRepository;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::cli::SyncCommand;

pub async fn run(app: &App, command: SyncCommand) -> Result<()> {
    let sync = app.sync_service()?;
    match command {
        SyncCommand::Pull => {
            if sync.pull().await? {
                let count = app.repo.tasks().len();
                println!("{} {count} tasks from {}", "Pulled".green(), sync.path());
            } else {
                println!("Nothing to pull from {}", app.config.remote_dir.display());
            }
        }
        SyncCommand::Push => {
            let data = sync.push().await?;
            println!(
                "{} {} tasks to {}",
                "Pushed".green(),
                data.tasks.len(),
                sync.path()
            );
        }
    }
    Ok(())
}
