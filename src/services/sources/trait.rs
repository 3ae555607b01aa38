use crate::config::Config;
use crate::error::Result;
use crate::hints::{HintKind, HintValue};
use crate::services::display::SharedDisplay;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use super::dry_run::DryRunSource;
use super::host::HostSource;
use super::monitor::MonitorSource;
use super::wifi::WifiSource;

/// Источник подсказок одной категории
#[async_trait::async_trait]
pub trait HintSource: Send + Sync {
    fn kind(&self) -> HintKind;

    /// Захват ресурса источника (сокет, подписка на события)
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    /// Освобождение ресурса, вызывается даже после ошибки в `watch`
    async fn disconnect(&self) {}

    /// Снимок на текущий момент
    async fn query(&self) -> Result<HintValue>;

    fn poll_interval(&self) -> Duration;

    /// Непрерывный поток снимков. По умолчанию - периодический `query()`.
    /// Завершается с `Ok`, когда получатель закрыт.
    async fn watch(&self, tx: mpsc::Sender<HintValue>) -> Result<()> {
        let mut ticker = interval(self.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let value = self.query().await?;
            if tx.send(value).await.is_err() {
                return Ok(());
            }
        }
    }
}

/// Factory function to create the hint sources based on the dry_run flag
pub fn create_sources(
    config: Arc<Config>,
    display: Option<SharedDisplay>,
    dry_run: bool,
) -> Result<Vec<Arc<dyn HintSource>>> {
    let detection = &config.detection;

    if dry_run {
        return Ok(DryRunSource::all(detection.wifi_interval()));
    }

    let mut sources: Vec<Arc<dyn HintSource>> = vec![
        Arc::new(HostSource::new(detection.host_interval())),
        Arc::new(WifiSource::new(detection.wifi_interval())),
    ];

    if let Some(display) = display {
        sources.push(Arc::new(MonitorSource::new(
            display,
            detection.monitor_poll_interval(),
            detection.debounce(),
        )));
    }

    Ok(sources)
}
