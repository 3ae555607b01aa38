use crate::config::ActionConfig;
use crate::debug_if_enabled;
use crate::error::{AppError, Result};
use crate::services::listeners::CorrelatedValues;
use tokio::process::Command;
use tracing::info;

use super::r#trait::Action;

/// Запуск внешней программы из `args` с подстановкой значений подсказок
pub struct CommandAction;

impl CommandAction {
    pub const NAME: &'static str = "command";
}

/// `{hostname}`, `{ssid}` и `{monitors}` заменяются значениями из подсказок,
/// неизвестная категория даёт пустую строку.
pub fn substitute(arg: &str, values: &CorrelatedValues) -> String {
    if !arg.contains('{') {
        return arg.to_string();
    }

    let hostname = values.host().map(|h| h.hostname.as_str()).unwrap_or("");
    let ssid = values
        .wifi()
        .and_then(|networks| networks.iter().find_map(|w| w.ssid.as_deref()))
        .unwrap_or("");
    let monitors = values
        .monitors()
        .map(|monitors| {
            monitors
                .iter()
                .map(|m| m.monitor_name.as_deref().unwrap_or(&m.output_name))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();

    arg.replace("{hostname}", hostname)
        .replace("{ssid}", ssid)
        .replace("{monitors}", &monitors)
}

/// Запустить программу и дождаться завершения; ненулевой код - ошибка действия
pub(super) async fn run_program(action: &str, argv: &[String]) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| AppError::action(action, "не задана программа"))?;

    debug_if_enabled!("Действие '{}': запуск {:?}", action, argv);
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| AppError::action(action, format!("не удалось запустить {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::action(
            action,
            format!("{} завершился с {}: {}", program, output.status, stderr.trim()),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        info!("Действие '{}': {}", action, stdout.trim());
    }
    Ok(())
}

#[async_trait::async_trait]
impl Action for CommandAction {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, values: &CorrelatedValues, config: &ActionConfig) -> Result<()> {
        let argv: Vec<String> = config.args.iter().map(|arg| substitute(arg, values)).collect();
        run_program(Self::NAME, &argv).await
    }
}
