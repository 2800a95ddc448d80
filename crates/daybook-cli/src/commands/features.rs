use anyhow::Result;
use daybook_core::features::{clear_overrides, save_override};

use crate::app::App;
use crate::cli::{FeatureAction, FeaturesCommand};
use crate::views::table::display_features;

pub async fn run(app: &App, command: FeaturesCommand) -> Result<()> {
    let kv = app.kv();
    match command.action {
        None => {
            display_features(&app.features);
            return Ok(());
        }
        Some(FeatureAction::Enable { feature }) => {
            save_override(kv.as_ref(), feature, true).await?;
            println!("Enabled {feature}");
        }
        Some(FeatureAction::Disable { feature }) => {
            save_override(kv.as_ref(), feature, false).await?;
            println!("Disabled {feature}");
        }
        Some(FeatureAction::Reset) => {
            clear_overrides(kv.as_ref()).await?;
            println!("Feature overrides cleared");
        }
    }

    let flags = app.config.features.apply_overrides(kv.as_ref()).await?;
    display_features(&flags);
    Ok(())
}
