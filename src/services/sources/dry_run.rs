use crate::error::Result;
use crate::hints::{
    HintKind, HintValue, HostHint, MonitorHint, Position, Rotation, ScreenHint, Size, WifiHint,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::r#trait::HintSource;

/// Источник для режима сухого запуска: по кругу отдаёт заранее заготовленные снимки
pub struct DryRunSource {
    kind: HintKind,
    values: Vec<HintValue>,
    next: Mutex<usize>,
    interval: Duration,
}

impl DryRunSource {
    pub fn new(kind: HintKind, values: Vec<HintValue>, interval: Duration) -> Self {
        Self {
            kind,
            values,
            next: Mutex::new(0),
            interval,
        }
    }

    pub fn all(interval: Duration) -> Vec<Arc<dyn HintSource>> {
        let screen = |x: i32, y: i32, rotation: Rotation| ScreenHint {
            position: Position::new(x, y),
            size: Size::new(3840, 2160),
            rotation,
        };

        let desk = vec![
            MonitorHint::new(66, "DP-1")
                .with_physical_size(600, 340)
                .with_monitor(Some("XV273K".to_string()), None)
                .with_screen(Some(screen(0, 960, Rotation::R0))),
            MonitorHint::new(67, "DP-2")
                .with_physical_size(530, 300)
                .with_monitor(Some("CB240HYK".to_string()), None)
                .with_screen(Some(screen(3840, 0, Rotation::R90))),
        ];
        let laptop = vec![MonitorHint::new(70, "eDP-1")
            .with_physical_size(310, 170)
            .with_screen(Some(screen(0, 0, Rotation::R0)))];

        vec![
            Arc::new(Self::new(
                HintKind::Host,
                vec![HintValue::Host(HostHint::new(std::env::consts::OS, "dry-run"))],
                interval,
            )),
            Arc::new(Self::new(
                HintKind::Wifi,
                vec![
                    HintValue::Wifi(vec![WifiHint::new("wlan0")
                        .with_ssid("home")
                        .with_mac("02:00:00:00:00:01")]),
                    HintValue::Wifi(vec![WifiHint::new("wlan0").with_ssid("office")]),
                ],
                interval,
            )),
            Arc::new(Self::new(
                HintKind::Monitor,
                vec![HintValue::Monitor(desk), HintValue::Monitor(laptop)],
                interval * 2,
            )),
        ]
    }
}

#[async_trait::async_trait]
impl HintSource for DryRunSource {
    fn kind(&self) -> HintKind {
        self.kind
    }

    async fn connect(&self) -> Result<()> {
        info!("Dry-run: источник '{}' работает в режиме эмуляции", self.kind);
        Ok(())
    }

    async fn query(&self) -> Result<HintValue> {
        let mut next = self.next.lock();
        let value = self.values[*next % self.values.len()].clone();
        *next = (*next + 1) % self.values.len();
        Ok(value)
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }
}
