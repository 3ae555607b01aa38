use crate::config::ActionConfig;
use crate::error::Result;
use crate::services::display::{ScreenSize, SharedDisplay};
use crate::services::layout::LayoutResolver;
use crate::services::listeners::CorrelatedValues;
use crate::services::reconfigure::{DisplaySnapshot, ReconfigurationTransaction};
use parking_lot::Mutex;
use tracing::info;

use super::r#trait::Action;

/// Подобрать раскладку под текущие выходы и применить её
pub struct LayoutAction {
    display: SharedDisplay,
    resolver: Mutex<LayoutResolver>,
}

impl LayoutAction {
    pub const NAME: &'static str = "layout";

    pub fn new(display: SharedDisplay, resolver: LayoutResolver) -> Self {
        info!("LayoutAction: зарегистрировано раскладок {}", resolver.len());
        Self {
            display,
            resolver: Mutex::new(resolver),
        }
    }

    /// Один проход: снимок, выбор политики, транзакция.
    /// `Ok(None)`, если ни одна раскладка не подошла.
    pub async fn apply(&self) -> Result<Option<ScreenSize>> {
        let backend = self.display.lock().await;
        let snapshot = DisplaySnapshot::capture(backend.as_ref())?;

        let resolved = {
            let mut resolver = self.resolver.lock();
            resolver.resolve(&snapshot.layout_hints())
        };
        let Some(resolved) = resolved else {
            return Ok(None);
        };

        let screen = ReconfigurationTransaction::new(backend.as_ref()).apply(&snapshot, &resolved)?;
        info!(
            "Раскладка '{}' применена, экран {}x{}",
            resolved.policy, screen.width, screen.height
        );
        Ok(Some(screen))
    }
}

#[async_trait::async_trait]
impl Action for LayoutAction {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, _values: &CorrelatedValues, _config: &ActionConfig) -> Result<()> {
        self.apply().await.map(|_| ())
    }
}
