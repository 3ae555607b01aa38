use crate::config::ActionConfig;
use crate::debug_if_enabled;
use crate::error::{AppError, Result};
use crate::services::listeners::CorrelatedValues;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::command::{run_program, substitute};
use super::r#trait::Action;

/// Файл из шаблона: `{{ имя }}` в `src` заменяется значением из
/// `replacements`, результат пишется в `target`.
///
/// Значения подстановок сами могут ссылаться на подсказки (`{ssid}`,
/// `{hostname}`, `{monitors}`). Если содержимое не изменилось, файл не
/// трогается и `reload` не запускается.
pub struct TemplateAction;

impl TemplateAction {
    pub const NAME: &'static str = "template";

    fn path(config: &ActionConfig, param: &str) -> Result<PathBuf> {
        config
            .params
            .get(param)
            .map(PathBuf::from)
            .ok_or_else(|| AppError::action(Self::NAME, format!("не задан параметр '{}'", param)))
    }
}

/// Подставить значения в шаблон; неизвестное имя - ошибка
pub fn render(template: &str, replacements: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            AppError::action(TemplateAction::NAME, "незакрытая подстановка '{{'")
        })?;

        let key = after[..end].trim();
        let value = replacements.get(key).ok_or_else(|| {
            AppError::action(TemplateAction::NAME, format!("неизвестная подстановка '{}'", key))
        })?;
        out.push_str(value);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Записать через временный файл рядом с целью; `false`, если содержимое то же
async fn write_if_changed(target: &Path, content: &str) -> Result<bool> {
    match tokio::fs::read_to_string(target).await {
        Ok(current) if current == content => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut tmp = target.as_os_str().to_owned();
    tmp.push(".deskctx-tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, target).await?;
    Ok(true)
}

#[async_trait::async_trait]
impl Action for TemplateAction {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, values: &CorrelatedValues, config: &ActionConfig) -> Result<()> {
        let src = Self::path(config, "src")?;
        let target = Self::path(config, "target")?;

        let template = tokio::fs::read_to_string(&src).await.map_err(|e| {
            AppError::action(Self::NAME, format!("не удалось прочитать {}: {}", src.display(), e))
        })?;

        let replacements: BTreeMap<String, String> = config
            .replacements
            .iter()
            .map(|(key, value)| (key.clone(), substitute(value, values)))
            .collect();
        debug_if_enabled!("Шаблон {}: подстановки {:?}", src.display(), replacements);

        let rendered = render(&template, &replacements)?;
        if !write_if_changed(&target, &rendered).await? {
            debug!("Шаблон {}: {} не изменился", src.display(), target.display());
            return Ok(());
        }
        info!("Шаблон {} записан в {}", src.display(), target.display());

        if let Some(reload) = config.params.get("reload") {
            let argv: Vec<String> = reload.split_whitespace().map(str::to_string).collect();
            run_program(Self::NAME, &argv).await?;
        }
        Ok(())
    }
}
