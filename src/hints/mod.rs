pub mod host;
pub mod monitor;
pub mod wifi;

pub use host::HostHint;
pub use monitor::{CrtcId, MonitorHint, ModeId, OutputId, Position, Rotation, ScreenHint, Size};
pub use wifi::WifiHint;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Категория подсказки об окружении
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintKind {
    Host,
    Wifi,
    Monitor,
}

impl HintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HintKind::Host => "host",
            HintKind::Wifi => "wifi",
            HintKind::Monitor => "monitor",
        }
    }
}

impl fmt::Display for HintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HintKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(HintKind::Host),
            "wifi" => Ok(HintKind::Wifi),
            "monitor" => Ok(HintKind::Monitor),
            other => Err(format!("неизвестная категория подсказок: {}", other)),
        }
    }
}

/// Снимок одной категории подсказок.
///
/// Значения неизменяемы: источник каждый раз создаёт новый снимок целиком,
/// а агрегатор хранит его за `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintValue {
    Host(HostHint),
    Wifi(Vec<WifiHint>),
    Monitor(Vec<MonitorHint>),
}

impl HintValue {
    pub fn kind(&self) -> HintKind {
        match self {
            HintValue::Host(_) => HintKind::Host,
            HintValue::Wifi(_) => HintKind::Wifi,
            HintValue::Monitor(_) => HintKind::Monitor,
        }
    }

    pub fn as_host(&self) -> Option<&HostHint> {
        match self {
            HintValue::Host(host) => Some(host),
            _ => None,
        }
    }

    pub fn as_wifi(&self) -> Option<&[WifiHint]> {
        match self {
            HintValue::Wifi(wifi) => Some(wifi),
            _ => None,
        }
    }

    pub fn as_monitors(&self) -> Option<&[MonitorHint]> {
        match self {
            HintValue::Monitor(monitors) => Some(monitors),
            _ => None,
        }
    }
}

impl fmt::Display for HintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HintValue::Host(host) => write!(f, "{}", host),
            HintValue::Wifi(wifi) => {
                let names: Vec<String> = wifi.iter().map(|w| w.to_string()).collect();
                write!(f, "wifi[{}]", names.join(", "))
            }
            HintValue::Monitor(monitors) => {
                let names: Vec<String> = monitors.iter().map(|m| m.to_string()).collect();
                write!(f, "monitors[{}]", names.join(", "))
            }
        }
    }
}
