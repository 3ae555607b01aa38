use crate::config::MonitorRuleConfig;
use crate::hints::MonitorHint;
use std::fmt;

/// Сопоставление монитора по имени выхода, имени из EDID и серийному номеру.
/// Заданные поля должны совпасть все.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorMatcher {
    pub output: Option<String>,
    pub name: Option<String>,
    pub serial: Option<String>,
}

impl MonitorMatcher {
    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Default::default()
        }
    }

    pub fn from_config(config: &MonitorRuleConfig) -> Self {
        Self {
            output: config.output.clone(),
            name: config.name.clone(),
            serial: config.serial.clone(),
        }
    }

    pub fn matches(&self, monitor: &MonitorHint) -> bool {
        if self.output.is_none() && self.name.is_none() && self.serial.is_none() {
            return false;
        }

        field_matches(&self.output, Some(monitor.output_name.as_str()))
            && field_matches(&self.name, monitor.monitor_name.as_deref())
            && field_matches(&self.serial, monitor.monitor_serial.as_deref())
    }
}

fn field_matches(expected: &Option<String>, actual: Option<&str>) -> bool {
    match expected {
        Some(expected) => actual == Some(expected.as_str()),
        None => true,
    }
}

impl fmt::Display for MonitorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(output) = &self.output {
            parts.push(format!("output={}", output));
        }
        if let Some(name) = &self.name {
            parts.push(format!("name={}", name));
        }
        if let Some(serial) = &self.serial {
            parts.push(format!("serial={}", serial));
        }
        write!(f, "[{}]", parts.join(", "))
    }
}
