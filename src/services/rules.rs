use crate::config::{ConditionConfig, RuleConfig};
use crate::error::{AppError, Result};
use crate::hints::HintKind;
use crate::services::actions::ActionDispatcher;
use crate::services::listeners::{CorrelatedValues, Listener, ListenerRegistry};
use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Значение, за изменением которого следит правило
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExpr {
    Hostname,
    Ssid,
    MonitorNames,
    MonitorOutputs,
    MonitorScreens,
}

impl WatchExpr {
    pub fn kind(&self) -> HintKind {
        match self {
            WatchExpr::Hostname => HintKind::Host,
            WatchExpr::Ssid => HintKind::Wifi,
            WatchExpr::MonitorNames | WatchExpr::MonitorOutputs | WatchExpr::MonitorScreens => {
                HintKind::Monitor
            }
        }
    }

    /// `None`, если категория не входит в значения правила
    pub fn evaluate(&self, values: &CorrelatedValues) -> Option<String> {
        match self {
            WatchExpr::Hostname => values.host().map(|h| h.hostname.clone()),
            WatchExpr::Ssid => values.wifi().map(|networks| {
                networks
                    .iter()
                    .filter_map(|w| w.ssid.as_deref())
                    .collect::<Vec<_>>()
                    .join(",")
            }),
            WatchExpr::MonitorNames => values.monitors().map(|monitors| {
                monitors
                    .iter()
                    .filter_map(|m| m.monitor_name.as_deref())
                    .collect::<Vec<_>>()
                    .join(",")
            }),
            WatchExpr::MonitorOutputs => values.monitors().map(|monitors| {
                monitors
                    .iter()
                    .map(|m| m.output_name.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            }),
            WatchExpr::MonitorScreens => values.monitors().map(|monitors| {
                monitors
                    .iter()
                    .map(|m| match &m.screen {
                        Some(screen) => format!("{}:{}", m.output_name, screen),
                        None => format!("{}:off", m.output_name),
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            }),
        }
    }
}

impl FromStr for WatchExpr {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "host.hostname" => Ok(WatchExpr::Hostname),
            "wifi.ssid" => Ok(WatchExpr::Ssid),
            "monitor.names" => Ok(WatchExpr::MonitorNames),
            "monitor.outputs" => Ok(WatchExpr::MonitorOutputs),
            "monitor.screens" => Ok(WatchExpr::MonitorScreens),
            other => Err(format!("неизвестное выражение watch: {}", other)),
        }
    }
}

impl fmt::Display for WatchExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchExpr::Hostname => "host.hostname",
            WatchExpr::Ssid => "wifi.ssid",
            WatchExpr::MonitorNames => "monitor.names",
            WatchExpr::MonitorOutputs => "monitor.outputs",
            WatchExpr::MonitorScreens => "monitor.screens",
        };
        f.write_str(s)
    }
}

/// Условие правила: все заданные проверки должны выполниться
#[derive(Debug, Clone, Default)]
pub struct Condition {
    config: ConditionConfig,
}

impl Condition {
    pub fn new(config: ConditionConfig) -> Self {
        Self { config }
    }

    pub fn holds(&self, values: &CorrelatedValues) -> bool {
        let ssids: Vec<&str> = values
            .wifi()
            .map(|networks| networks.iter().filter_map(|w| w.ssid.as_deref()).collect())
            .unwrap_or_default();

        if let Some(hostname) = &self.config.hostname {
            if values.host().map(|h| &h.hostname) != Some(hostname) {
                return false;
            }
        }

        if let Some(ssid) = &self.config.ssid {
            if !ssids.contains(&ssid.as_str()) {
                return false;
            }
        }

        if let Some(ssid) = &self.config.not_ssid {
            if ssids.contains(&ssid.as_str()) {
                return false;
            }
        }

        if !self.config.monitors.is_empty() {
            let Some(monitors) = values.monitors() else {
                return false;
            };
            let present = |wanted: &String| {
                monitors.iter().any(|m| {
                    m.output_name == *wanted || m.monitor_name.as_deref() == Some(wanted.as_str())
                })
            };
            if !self.config.monitors.iter().all(present) {
                return false;
            }
        }

        true
    }
}

/// Правило из конфигурации как слушатель реестра
pub struct RuleListener {
    rule: RuleConfig,
    condition: Condition,
    watch: Vec<WatchExpr>,
    last_watched: Mutex<Option<Vec<Option<String>>>>,
    dispatcher: Arc<ActionDispatcher>,
}

impl RuleListener {
    pub fn new(rule: RuleConfig, dispatcher: Arc<ActionDispatcher>) -> Result<Self> {
        let watch = rule
            .watch
            .iter()
            .map(|expr| {
                expr.parse::<WatchExpr>()
                    .map_err(|e| AppError::Config(anyhow::anyhow!("правило '{}': {}", rule.name, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            condition: Condition::new(rule.condition.clone()),
            rule,
            watch,
            last_watched: Mutex::new(None),
            dispatcher,
        })
    }

    /// `true`, если все наблюдаемые значения совпали с прошлым выполненным запуском
    fn unchanged(&self, watched: &[Option<String>]) -> bool {
        if self.watch.is_empty() {
            return false;
        }
        self.last_watched.lock().as_deref() == Some(watched)
    }
}

#[async_trait::async_trait]
impl Listener for RuleListener {
    async fn on_hints(&self, trigger: Option<HintKind>, values: &CorrelatedValues) -> Result<()> {
        if !self.condition.holds(values) {
            debug!("Правило '{}': условие не выполнено", self.rule.name);
            return Ok(());
        }

        let watched: Vec<Option<String>> = self.watch.iter().map(|w| w.evaluate(values)).collect();
        if self.unchanged(&watched) {
            debug!("Правило '{}': наблюдаемые значения не изменились", self.rule.name);
            return Ok(());
        }

        info!(
            "Правило '{}' сработало (триггер: {})",
            self.rule.name,
            trigger.map_or("bootstrap", |k| k.as_str())
        );
        self.dispatcher
            .dispatch(&self.rule.name, &self.rule.actions, values)
            .await?;

        *self.last_watched.lock() = Some(watched);
        Ok(())
    }
}

/// Подписать все правила конфигурации на реестр
pub fn register_rules(
    registry: &mut ListenerRegistry,
    rules: &[RuleConfig],
    dispatcher: Arc<ActionDispatcher>,
) -> Result<()> {
    for rule in rules {
        let kinds = rule.event_kinds()?;
        let listener = RuleListener::new(rule.clone(), dispatcher.clone())?;
        registry.subscribe(rule.name.clone(), kinds, Arc::new(listener));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActionConfig;
    use crate::hints::{HintValue, HostHint, MonitorHint, Position, Rotation, ScreenHint, Size, WifiHint};
    use crate::services::actions::Action;
    use crate::services::detection::DetectionState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl Action for Counting {
        fn name(&self) -> &'static str {
            "count"
        }

        async fn run(&self, _values: &CorrelatedValues, _config: &ActionConfig) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn values(ssid: Option<&str>, monitors: Vec<MonitorHint>) -> CorrelatedValues {
        let mut state = DetectionState::default();
        state.update(HintKind::Host, HintValue::Host(HostHint::new("linux", "box")));
        let wifi = match ssid {
            Some(ssid) => vec![WifiHint::new("wlan0").with_ssid(ssid)],
            None => vec![WifiHint::new("wlan0")],
        };
        state.update(HintKind::Wifi, HintValue::Wifi(wifi));
        state.update(HintKind::Monitor, HintValue::Monitor(monitors));
        CorrelatedValues::collect(&[HintKind::Host, HintKind::Wifi, HintKind::Monitor], &state).unwrap()
    }

    fn dp1(x: i32) -> MonitorHint {
        MonitorHint::new(66, "DP-1")
            .with_monitor(Some("XV273K".to_string()), None)
            .with_screen(Some(ScreenHint {
                position: Position::new(x, 0),
                size: Size::new(3840, 2160),
                rotation: Rotation::R0,
            }))
    }

    fn rule(watch: &[&str], condition: ConditionConfig) -> RuleConfig {
        RuleConfig {
            name: "desk".to_string(),
            events: vec!["host".to_string(), "wifi".to_string(), "monitor".to_string()],
            condition,
            watch: watch.iter().map(|s| s.to_string()).collect(),
            actions: vec![ActionConfig {
                name: "count".to_string(),
                ..Default::default()
            }],
        }
    }

    fn listener(rule: RuleConfig) -> (RuleListener, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = ActionDispatcher::new();
        dispatcher.register(Arc::new(Counting(runs.clone())));
        (RuleListener::new(rule, Arc::new(dispatcher)).unwrap(), runs)
    }

    #[test]
    fn test_watch_expr_parse() {
        assert_eq!("wifi.ssid".parse::<WatchExpr>(), Ok(WatchExpr::Ssid));
        assert_eq!(WatchExpr::MonitorScreens.to_string(), "monitor.screens");
        assert!("wifi.password".parse::<WatchExpr>().is_err());
    }

    #[test]
    fn test_condition_checks() {
        let at_home = values(Some("home"), vec![dp1(0)]);

        let condition = Condition::new(ConditionConfig {
            hostname: Some("box".to_string()),
            ssid: Some("home".to_string()),
            monitors: vec!["XV273K".to_string()],
            ..Default::default()
        });
        assert!(condition.holds(&at_home));
        assert!(!condition.holds(&values(Some("office"), vec![dp1(0)])));
        assert!(!condition.holds(&values(Some("home"), vec![])));

        let not_home = Condition::new(ConditionConfig {
            not_ssid: Some("home".to_string()),
            ..Default::default()
        });
        assert!(!not_home.holds(&at_home));
        assert!(not_home.holds(&values(None, vec![])));
    }

    #[test]
    fn test_unsubscribed_category_is_absent() {
        let mut state = DetectionState::default();
        state.update(HintKind::Host, HintValue::Host(HostHint::new("linux", "box")));
        let host_only = CorrelatedValues::collect(&[HintKind::Host], &state).unwrap();

        assert_eq!(WatchExpr::Ssid.evaluate(&host_only), None);
        let condition = Condition::new(ConditionConfig {
            monitors: vec!["DP-1".to_string()],
            ..Default::default()
        });
        assert!(!condition.holds(&host_only));
    }

    #[tokio::test]
    async fn test_unchanged_watch_skips_actions() {
        let (listener, runs) = listener(rule(&["monitor.screens"], ConditionConfig::default()));

        listener.on_hints(Some(HintKind::Monitor), &values(None, vec![dp1(0)])).await.unwrap();
        listener.on_hints(Some(HintKind::Wifi), &values(Some("home"), vec![dp1(0)])).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        listener.on_hints(Some(HintKind::Monitor), &values(None, vec![dp1(1920)])).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_watch_runs_every_time() {
        let (listener, runs) = listener(rule(&[], ConditionConfig::default()));
        let same = values(None, vec![dp1(0)]);

        listener.on_hints(None, &same).await.unwrap();
        listener.on_hints(None, &same).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_condition_skips_actions() {
        let (listener, runs) = listener(rule(
            &[],
            ConditionConfig {
                hostname: Some("laptop".to_string()),
                ..Default::default()
            },
        ));

        listener.on_hints(None, &values(None, vec![])).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
