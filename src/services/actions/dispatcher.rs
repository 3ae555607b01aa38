use crate::app_error;
use crate::config::ActionConfig;
use crate::error::Result;
use crate::services::listeners::CorrelatedValues;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::r#trait::Action;

/// Запуск действий правила по порядку объявления.
///
/// Неизвестное имя логируется и пропускается. Ошибка действия останавливает
/// оставшиеся: следующие могут рассчитывать на результат предыдущих.
pub struct ActionDispatcher {
    actions: HashMap<&'static str, Arc<dyn Action>>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    pub fn register(&mut self, action: Arc<dyn Action>) {
        debug!("Зарегистрировано действие '{}'", action.name());
        self.actions.insert(action.name(), action);
    }

    pub async fn dispatch(
        &self,
        rule: &str,
        actions: &[ActionConfig],
        values: &CorrelatedValues,
    ) -> Result<()> {
        for config in actions {
            let Some(action) = self.actions.get(config.name.as_str()) else {
                let e = app_error!(unknown_action, "{}", config.name);
                error!("Правило '{}': {}", rule, e);
                continue;
            };

            info!("Правило '{}': действие '{}'", rule, config.name);
            action.run(values, config).await?;
        }
        Ok(())
    }
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
