use crate::debug_if_enabled;
use crate::error::Result;
use crate::hints::{HintKind, HintValue, MonitorHint};
use crate::services::debounce::Debouncer;
use crate::services::display::{query_monitors, query_output, DisplayBackend, DisplayChange, SharedDisplay};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::r#trait::HintSource;

/// Мониторы и их текущая геометрия.
///
/// После начального снимка источник слушает уведомления RandR и копит их:
/// изменения по отдельным выходам и CRTC сводятся в один снимок, который
/// отправляется только после тихого окна `quiet_window`.
pub struct MonitorSource {
    display: SharedDisplay,
    poll_interval: Duration,
    quiet_window: Duration,
}

impl MonitorSource {
    pub fn new(display: SharedDisplay, poll_interval: Duration, quiet_window: Duration) -> Self {
        Self {
            display,
            poll_interval,
            quiet_window,
        }
    }

    /// Применить одно уведомление к текущему набору, `true` если набор мог измениться
    fn apply_change(
        backend: &dyn DisplayBackend,
        monitors: &mut Vec<MonitorHint>,
        change: DisplayChange,
    ) -> Result<bool> {
        match change {
            DisplayChange::Output {
                output, connected, ..
            } => {
                debug!("Изменился выход {} (подключён: {})", output, connected);
                let hint = if connected {
                    query_output(backend, output)?
                } else {
                    None
                };
                Self::replace(monitors, output, hint);
                Ok(true)
            }
            DisplayChange::Crtc { crtc, mode } => {
                debug!("Изменился CRTC {} (режим: {:?})", crtc, mode);
                // Выключенный CRTC уже не знает своих выходов, обновляем всё известное
                let outputs: Vec<_> = monitors.iter().map(|m| m.output_id).collect();
                for output in outputs {
                    let hint = query_output(backend, output)?;
                    Self::replace(monitors, output, hint);
                }
                Ok(true)
            }
            DisplayChange::Other => Ok(false),
        }
    }

    fn replace(monitors: &mut Vec<MonitorHint>, output: u32, hint: Option<MonitorHint>) {
        let position = monitors.iter().position(|m| m.output_id == output);
        match (position, hint) {
            (Some(index), Some(hint)) => monitors[index] = hint,
            (None, Some(hint)) => monitors.push(hint),
            (Some(index), None) => {
                monitors.remove(index);
            }
            (None, None) => {}
        }
    }

    /// Вычитать все накопившиеся уведомления
    async fn drain(&self, monitors: &mut Vec<MonitorHint>) -> Result<bool> {
        let backend = self.display.lock().await;
        let mut changed = false;
        let mut count = 0usize;

        while let Some(change) = backend.poll_change_event()? {
            count += 1;
            changed |= Self::apply_change(backend.as_ref(), monitors, change)?;
        }

        if count > 0 {
            debug_if_enabled!("Обработано {} уведомлений RandR", count);
        }
        Ok(changed)
    }
}

#[async_trait::async_trait]
impl HintSource for MonitorSource {
    fn kind(&self) -> HintKind {
        HintKind::Monitor
    }

    async fn connect(&self) -> Result<()> {
        self.display.lock().await.select_change_events()?;
        info!("Подписка на уведомления RandR активна");
        Ok(())
    }

    async fn disconnect(&self) {
        match self.display.lock().await.clear_change_events() {
            Ok(()) => info!("Подписка на уведомления RandR снята"),
            Err(e) => warn!("Не удалось снять подписку RandR: {}", e),
        }
    }

    async fn query(&self) -> Result<HintValue> {
        let backend = self.display.lock().await;
        Ok(HintValue::Monitor(query_monitors(backend.as_ref())?))
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn watch(&self, tx: mpsc::Sender<HintValue>) -> Result<()> {
        let mut monitors = match self.query().await? {
            HintValue::Monitor(monitors) => monitors,
            _ => Vec::new(),
        };

        if tx.send(HintValue::Monitor(monitors.clone())).await.is_err() {
            return Ok(());
        }

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut debouncer = Debouncer::new(self.quiet_window);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.drain(&mut monitors).await? {
                        if !debouncer.is_pending() {
                            debug!("Серия уведомлений RandR, ждём {:?} тишины", self.quiet_window);
                        }
                        debouncer.touch();
                    }
                }
                _ = debouncer.fired() => {
                    debug!("Тихое окно истекло, отправляем {} монитор(ов)", monitors.len());
                    if tx.send(HintValue::Monitor(monitors.clone())).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
