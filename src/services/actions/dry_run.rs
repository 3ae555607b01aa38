use crate::config::ActionConfig;
use crate::error::Result;
use crate::services::listeners::CorrelatedValues;
use tracing::info;

use super::r#trait::Action;

/// Только логирует, что было бы сделано
pub struct DryRunAction {
    name: &'static str,
}

impl DryRunAction {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait::async_trait]
impl Action for DryRunAction {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, values: &CorrelatedValues, config: &ActionConfig) -> Result<()> {
        info!(
            "Dry-run: действие '{}' (args: {:?}, params: {:?}) для {}",
            self.name, config.args, config.params, values
        );
        Ok(())
    }
}
