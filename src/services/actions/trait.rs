use crate::config::{ActionConfig, Config};
use crate::error::Result;
use crate::services::display::SharedDisplay;
use crate::services::layout::{create_policies, LayoutResolver};
use crate::services::listeners::CorrelatedValues;
use std::sync::Arc;
use tracing::{info, warn};

use super::command::CommandAction;
use super::dispatcher::ActionDispatcher;
use super::dry_run::DryRunAction;
use super::layout::LayoutAction;
use super::template::TemplateAction;
use super::wallpaper::WallpaperAction;

/// Именованный побочный эффект, который запускает правило
#[async_trait::async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, values: &CorrelatedValues, config: &ActionConfig) -> Result<()>;
}

/// Factory function to create the action dispatcher based on the dry_run flag
pub fn create_dispatcher(
    config: Arc<Config>,
    display: Option<SharedDisplay>,
    dry_run: bool,
) -> Result<ActionDispatcher> {
    let mut dispatcher = ActionDispatcher::new();

    if dry_run {
        info!("Создание DryRun действий");
        for name in [
            LayoutAction::NAME,
            CommandAction::NAME,
            WallpaperAction::NAME,
            TemplateAction::NAME,
        ] {
            dispatcher.register(Arc::new(DryRunAction::new(name)));
        }
        return Ok(dispatcher);
    }

    match &display {
        Some(display) => {
            let resolver = LayoutResolver::new(create_policies(&config.layouts)?);
            dispatcher.register(Arc::new(LayoutAction::new(display.clone(), resolver)));
        }
        None => warn!("Нет соединения с дисплейным сервером, действие 'layout' недоступно"),
    }
    dispatcher.register(Arc::new(CommandAction));
    dispatcher.register(Arc::new(TemplateAction));
    dispatcher.register(Arc::new(WallpaperAction::new(config.wallpaper.clone(), display)));

    Ok(dispatcher)
}
