use crate::error::{AppError, Result};
use crate::hints::{HintKind, HintValue, WifiHint};
use crate::debug_if_enabled;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::r#trait::HintSource;

/// Wi-Fi интерфейсы через `iw dev`
pub struct WifiSource {
    interval: Duration,
}

impl WifiSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    async fn run_iw() -> Result<String> {
        let output = Command::new("iw")
            .arg("dev")
            .output()
            .await
            .map_err(|e| AppError::SourceUnavailable(format!("iw не найден: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("iw dev вернул ошибку: {}", stderr);
            return AppError::source_unavailable(format!("iw dev вернул ошибку: {}", stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Разбор вывода `iw dev`: по одной подсказке на каждый `Interface`
pub fn parse_iw_dev(stdout: &str) -> Vec<WifiHint> {
    let mut result: Vec<WifiHint> = Vec::new();

    for line in stdout.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("Interface ") {
            result.push(WifiHint::new(name.trim()));
            continue;
        }

        let Some(current) = result.last_mut() else {
            continue;
        };

        if let Some(addr) = line.strip_prefix("addr ") {
            current.mac = Some(addr.trim().to_string());
        } else if let Some(ssid) = line.strip_prefix("ssid ") {
            current.ssid = Some(ssid.trim().to_string());
        }
    }

    result
}

#[async_trait::async_trait]
impl HintSource for WifiSource {
    fn kind(&self) -> HintKind {
        HintKind::Wifi
    }

    async fn connect(&self) -> Result<()> {
        Self::run_iw().await?;
        info!("Детекция Wi-Fi через iw активна");
        Ok(())
    }

    async fn query(&self) -> Result<HintValue> {
        let stdout = Self::run_iw().await?;
        let interfaces = parse_iw_dev(&stdout);
        debug_if_enabled!("iw dev: {} интерфейс(ов)", interfaces.len());
        Ok(HintValue::Wifi(interfaces))
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }
}
