use serde::{Deserialize, Serialize};
use std::fmt;

/// Состояние одного беспроводного интерфейса
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WifiHint {
    pub interface_name: String,
    pub ssid: Option<String>,
    pub mac: Option<String>,
}

impl WifiHint {
    pub fn new(interface_name: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            ssid: None,
            mac: None,
        }
    }

    pub fn with_ssid(mut self, ssid: impl Into<String>) -> Self {
        self.ssid = Some(ssid.into());
        self
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }
}

impl fmt::Display for WifiHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ssid {
            Some(ssid) => write!(f, "{}@\"{}\"", self.interface_name, ssid),
            None => write!(f, "{} (не подключён)", self.interface_name),
        }
    }
}
