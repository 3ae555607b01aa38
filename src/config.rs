use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hints::{HintKind, Rotation};
use crate::services::rules::WatchExpr;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub wallpaper: WallpaperConfig,
    #[serde(default)]
    pub layouts: Vec<LayoutConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub wifi_interval_ms: u64,
    pub host_interval_ms: u64,
    pub monitor_poll_interval_ms: u64,
    pub debounce_ms: u64,
    /// 0 - не ждать таймаута
    pub bootstrap_timeout_ms: u64,
    pub bootstrap_wait_all: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            wifi_interval_ms: 10_000,
            host_interval_ms: 60_000,
            monitor_poll_interval_ms: 250,
            debounce_ms: 1_000,
            bootstrap_timeout_ms: 5_000,
            bootstrap_wait_all: false,
        }
    }
}

impl DetectionConfig {
    pub fn wifi_interval(&self) -> Duration {
        Duration::from_millis(self.wifi_interval_ms)
    }

    pub fn host_interval(&self) -> Duration {
        Duration::from_millis(self.host_interval_ms)
    }

    pub fn monitor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn bootstrap_timeout(&self) -> Option<Duration> {
        (self.bootstrap_timeout_ms > 0).then(|| Duration::from_millis(self.bootstrap_timeout_ms))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WallpaperConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub setter: Vec<String>,
}

impl Default for WallpaperConfig {
    fn default() -> Self {
        Self {
            directory: None,
            setter: vec![
                "feh".to_string(),
                "--no-fehbg".to_string(),
                "--bg-fill".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownMonitors {
    #[default]
    Disable,
    Left,
    Right,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayoutConfig {
    pub name: String,
    #[serde(default)]
    pub kind: LayoutKind,
    #[serde(default)]
    pub unknown_monitors: UnknownMonitors,
    #[serde(default)]
    pub monitors: Vec<MonitorRuleConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitorRuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub rotation: u16,
    #[serde(default)]
    pub primary: bool,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    pub name: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub condition: ConditionConfig,
    #[serde(default)]
    pub watch: Vec<String>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl RuleConfig {
    /// Категории в порядке объявления, без повторов
    pub fn event_kinds(&self) -> Result<Vec<HintKind>> {
        let mut kinds = Vec::with_capacity(self.events.len());
        for event in &self.events {
            let kind: HintKind = event
                .parse()
                .map_err(|e: String| anyhow::anyhow!("правило '{}': {}", self.name, e))?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConditionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_ssid: Option<String>,
    #[serde(default)]
    pub monitors: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ActionConfig {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Подстановки для действия `template`: имя в шаблоне -> значение
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub replacements: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
                filter: "deskctx=info".to_string(),
            },
            detection: DetectionConfig::default(),
            wallpaper: WallpaperConfig::default(),
            layouts: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("DESKCTX_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        // Валидация интервалов детекции
        let detection = &self.detection;
        if detection.wifi_interval_ms == 0
            || detection.host_interval_ms == 0
            || detection.monitor_poll_interval_ms == 0
        {
            anyhow::bail!("Интервалы опроса должны быть больше 0");
        }

        if detection.debounce_ms == 0 {
            anyhow::bail!("debounce_ms должно быть больше 0");
        }

        self.validate_layouts()?;
        self.validate_rules()?;

        Ok(())
    }

    fn validate_layouts(&self) -> Result<()> {
        let mut names = HashSet::new();

        for layout in &self.layouts {
            if layout.name.is_empty() {
                anyhow::bail!("Раскладка без имени");
            }
            if !names.insert(layout.name.as_str()) {
                anyhow::bail!("Раскладка '{}' объявлена дважды", layout.name);
            }
            if layout.monitors.is_empty() {
                anyhow::bail!("В раскладке '{}' нет ни одного монитора", layout.name);
            }

            let mut primaries = 0;
            for (i, monitor) in layout.monitors.iter().enumerate() {
                if monitor.output.is_none() && monitor.name.is_none() && monitor.serial.is_none() {
                    anyhow::bail!(
                        "Монитор #{} в раскладке '{}' должен задавать output, name или serial",
                        i + 1,
                        layout.name
                    );
                }
                if Rotation::from_degrees(monitor.rotation).is_none() {
                    anyhow::bail!(
                        "Неверный поворот {} у монитора #{} в раскладке '{}'",
                        monitor.rotation,
                        i + 1,
                        layout.name
                    );
                }
                if layout.kind == LayoutKind::Static && (monitor.x < 0 || monitor.y < 0) {
                    anyhow::bail!(
                        "Отрицательная позиция {}x{} у монитора #{} в статической раскладке '{}'",
                        monitor.x,
                        monitor.y,
                        i + 1,
                        layout.name
                    );
                }
                if monitor.primary {
                    primaries += 1;
                }
            }

            if primaries > 1 {
                anyhow::bail!("В раскладке '{}' больше одного основного монитора", layout.name);
            }
        }

        Ok(())
    }

    fn validate_rules(&self) -> Result<()> {
        for rule in &self.rules {
            if rule.name.is_empty() {
                anyhow::bail!("Правило без имени");
            }
            if rule.events.is_empty() {
                anyhow::bail!("Правило '{}' не подписано ни на одно событие", rule.name);
            }
            rule.event_kinds()?;

            for watch in &rule.watch {
                watch
                    .parse::<WatchExpr>()
                    .map_err(|e| anyhow::anyhow!("правило '{}': {}", rule.name, e))?;
            }

            for (i, action) in rule.actions.iter().enumerate() {
                if action.name.is_empty() {
                    anyhow::bail!("Пустое имя действия #{} в правиле '{}'", i + 1, rule.name);
                }
                if action.name == "template" {
                    for param in ["src", "target"] {
                        if !action.params.contains_key(param) {
                            anyhow::bail!(
                                "Действию template в правиле '{}' нужен параметр '{}'",
                                rule.name,
                                param
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
