use crate::app_error;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::hints::{HintKind, HintValue, HostHint, MonitorHint, WifiHint};
use crate::services::detection::{DetectionEvent, DetectionState};
use dashmap::DashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub type Categories = SmallVec<[HintKind; 3]>;

/// Значения подписанных категорий в порядке подписки
#[derive(Debug, Clone, Default)]
pub struct CorrelatedValues {
    entries: SmallVec<[(HintKind, Arc<HintValue>); 3]>,
}

impl CorrelatedValues {
    /// `None`, если хотя бы одна категория ещё неизвестна
    pub fn collect(categories: &[HintKind], state: &DetectionState) -> Option<Self> {
        let mut entries = SmallVec::new();
        for kind in categories {
            entries.push((*kind, state.get(*kind)?.clone()));
        }
        Some(Self { entries })
    }

    pub fn get(&self, kind: HintKind) -> Option<&HintValue> {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, value)| value.as_ref())
    }

    pub fn host(&self) -> Option<&HostHint> {
        self.get(HintKind::Host).and_then(HintValue::as_host)
    }

    pub fn wifi(&self) -> Option<&[WifiHint]> {
        self.get(HintKind::Wifi).and_then(HintValue::as_wifi)
    }

    pub fn monitors(&self) -> Option<&[MonitorHint]> {
        self.get(HintKind::Monitor).and_then(HintValue::as_monitors)
    }

    pub fn iter(&self) -> impl Iterator<Item = (HintKind, &HintValue)> {
        self.entries.iter().map(|(kind, value)| (*kind, value.as_ref()))
    }
}

impl fmt::Display for CorrelatedValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(kind, value)| format!("{}={}", kind, value))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Обработчик, который вызывается, когда известны все его категории
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
    async fn on_hints(&self, trigger: Option<HintKind>, values: &CorrelatedValues) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub runs: u64,
    pub failures: u64,
    /// Запуски, поглощённые более свежими за время работы обработчика
    pub coalesced: u64,
}

struct Firing {
    trigger: Option<HintKind>,
    values: CorrelatedValues,
}

struct Subscription {
    name: String,
    categories: Categories,
    queue: mpsc::UnboundedSender<Firing>,
    worker: JoinHandle<()>,
}

/// Реестр слушателей.
///
/// У каждого слушателя своя очередь и своя задача: запуски одного слушателя
/// идут строго друг за другом, разные слушатели работают параллельно.
/// Пока обработчик занят, из накопившихся запусков выполняется только
/// последний. Паника обработчика считается ошибкой одного запуска.
pub struct ListenerRegistry {
    subscriptions: Vec<Subscription>,
    stats: Arc<DashMap<String, ListenerStats>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
            stats: Arc::new(DashMap::new()),
        }
    }

    pub fn subscribe(
        &mut self,
        name: impl Into<String>,
        categories: impl IntoIterator<Item = HintKind>,
        handler: Arc<dyn Listener>,
    ) {
        let name = name.into();
        let mut unique = Categories::new();
        for kind in categories {
            if !unique.contains(&kind) {
                unique.push(kind);
            }
        }

        info!("Подписка '{}' на категории {:?}", name, unique);

        let (queue, rx) = mpsc::unbounded_channel();
        self.stats.insert(name.clone(), ListenerStats::default());
        let worker = tokio::spawn(Self::worker(name.clone(), handler, rx, self.stats.clone()));

        self.subscriptions.push(Subscription {
            name,
            categories: unique,
            queue,
            worker,
        });
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Поставить в очередь всех слушателей, которых касается событие.
    /// Возвращает число поставленных запусков.
    pub fn dispatch(&self, event: &DetectionEvent) -> usize {
        let mut fired = 0;

        for subscription in &self.subscriptions {
            if let Some(trigger) = event.trigger {
                if !subscription.categories.contains(&trigger) {
                    continue;
                }
            }

            let Some(values) = CorrelatedValues::collect(&subscription.categories, &event.state) else {
                debug_if_enabled!(
                    "Слушатель '{}' пропущен: известны не все категории",
                    subscription.name
                );
                continue;
            };

            let firing = Firing {
                trigger: event.trigger,
                values,
            };
            if subscription.queue.send(firing).is_err() {
                error!("Очередь слушателя '{}' закрыта", subscription.name);
                continue;
            }
            fired += 1;
        }

        fired
    }

    /// Раздавать события до закрытия потока, затем дождаться текущих запусков
    pub async fn run(self, mut events: mpsc::Receiver<DetectionEvent>) {
        info!("ListenerRegistry запущен, слушателей: {}", self.len());
        while let Some(event) = events.recv().await {
            let fired = self.dispatch(&event);
            debug!(
                "Событие {:?}: поставлено запусков {}",
                event.trigger, fired
            );
        }
        self.shutdown().await;
    }

    #[cfg(test)]
    pub fn stats(&self) -> Arc<DashMap<String, ListenerStats>> {
        self.stats.clone()
    }

    /// Закрыть очереди; уже начатые запуски доводятся до конца
    pub async fn shutdown(self) {
        for subscription in self.subscriptions {
            drop(subscription.queue);
            if let Err(e) = subscription.worker.await {
                error!("Задача слушателя '{}' завершилась аварийно: {}", subscription.name, e);
            }
        }

        for entry in self.stats.iter() {
            info!(
                "Слушатель '{}': запусков {}, ошибок {}, поглощено {}",
                entry.key(),
                entry.runs,
                entry.failures,
                entry.coalesced
            );
        }
    }

    async fn worker(
        name: String,
        handler: Arc<dyn Listener>,
        mut rx: mpsc::UnboundedReceiver<Firing>,
        stats: Arc<DashMap<String, ListenerStats>>,
    ) {
        while let Some(mut firing) = rx.recv().await {
            let mut skipped = 0u64;
            while let Ok(newer) = rx.try_recv() {
                firing = newer;
                skipped += 1;
            }
            if skipped > 0 {
                debug_if_enabled!("Слушатель '{}': пропущено устаревших запусков {}", name, skipped);
            }

            let trigger = firing
                .trigger
                .map_or_else(|| "bootstrap".to_string(), |kind| kind.to_string());
            debug!("Запуск слушателя '{}' (триггер: {})", name, trigger);

            let run = tokio::spawn({
                let handler = handler.clone();
                async move { handler.on_hints(firing.trigger, &firing.values).await }
            });
            let result = match run.await {
                Ok(result) => result,
                Err(e) => Err(app_error!(internal, "обработчик аварийно завершился: {}", e)),
            };

            let mut entry = stats.entry(name.clone()).or_default();
            entry.runs += 1;
            entry.coalesced += skipped;
            if let Err(e) = result {
                entry.failures += 1;
                error!("Слушатель '{}' (триггер: {}) завершился ошибкой: {}", name, trigger, e);
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use smallvec::smallvec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        firings: Mutex<Vec<(Option<HintKind>, Vec<HintKind>)>>,
        delay: Duration,
        fail: bool,
        running: AtomicUsize,
        max_running: AtomicUsize,
        running_total: Arc<AtomicUsize>,
        max_running_total: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Listener for Recorder {
        async fn on_hints(&self, trigger: Option<HintKind>, values: &CorrelatedValues) -> Result<()> {
            let own = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(own, Ordering::SeqCst);
            let total = self.running_total.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running_total.fetch_max(total, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.firings
                .lock()
                .push((trigger, values.iter().map(|(kind, _)| kind).collect()));

            self.running.fetch_sub(1, Ordering::SeqCst);
            self.running_total.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                return Err(app_error!(internal, "сбой по сценарию"));
            }
            Ok(())
        }
    }

    fn event(trigger: HintKind, state: &mut DetectionState, value: HintValue) -> DetectionEvent {
        state.update(trigger, value);
        DetectionEvent {
            trigger: Some(trigger),
            state: state.clone(),
        }
    }

    fn host() -> HintValue {
        HintValue::Host(HostHint::new("linux", "box"))
    }

    #[tokio::test]
    async fn test_fires_only_when_all_categories_known() {
        let recorder = Arc::new(Recorder::default());
        let mut registry = ListenerRegistry::new();
        registry.subscribe("pair", [HintKind::Wifi, HintKind::Host], recorder.clone());

        let mut state = DetectionState::default();
        assert_eq!(registry.dispatch(&event(HintKind::Host, &mut state, host())), 0);
        assert_eq!(
            registry.dispatch(&event(HintKind::Monitor, &mut state, HintValue::Monitor(vec![]))),
            0
        );
        assert_eq!(
            registry.dispatch(&event(HintKind::Wifi, &mut state, HintValue::Wifi(vec![]))),
            1
        );
        // Неподписанная категория не запускает слушателя
        assert_eq!(
            registry.dispatch(&event(
                HintKind::Monitor,
                &mut state,
                HintValue::Monitor(vec![MonitorHint::new(1, "DP-1")])
            )),
            0
        );

        registry.shutdown().await;
        let firings = recorder.firings.lock().clone();
        assert_eq!(firings, vec![(Some(HintKind::Wifi), vec![HintKind::Wifi, HintKind::Host])]);
    }

    #[tokio::test]
    async fn test_bootstrap_event_fires_complete_listeners() {
        let complete = Arc::new(Recorder::default());
        let partial = Arc::new(Recorder::default());
        let mut registry = ListenerRegistry::new();
        registry.subscribe("complete", [HintKind::Host], complete.clone());
        registry.subscribe("partial", [HintKind::Host, HintKind::Monitor], partial.clone());

        let mut state = DetectionState::default();
        state.update(HintKind::Host, host());
        let fired = registry.dispatch(&DetectionEvent {
            trigger: None,
            state,
        });

        assert_eq!(fired, 1);
        registry.shutdown().await;
        assert_eq!(complete.firings.lock().len(), 1);
        assert!(partial.firings.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_of_one_listener_never_overlap() {
        let running_total = Arc::new(AtomicUsize::new(0));
        let max_running_total = Arc::new(AtomicUsize::new(0));
        let recorder = || {
            Arc::new(Recorder {
                delay: Duration::from_secs(1),
                running_total: running_total.clone(),
                max_running_total: max_running_total.clone(),
                ..Default::default()
            })
        };
        let slow = recorder();
        let other = recorder();

        let mut registry = ListenerRegistry::new();
        let categories: Categories = smallvec![HintKind::Host];
        registry.subscribe("slow", categories.clone(), slow.clone());
        registry.subscribe("other", categories, other.clone());

        let mut state = DetectionState::default();
        for i in 0..3 {
            let value = HintValue::Host(HostHint::new("linux", format!("box-{}", i)));
            assert_eq!(registry.dispatch(&event(HintKind::Host, &mut state, value)), 2);
            tokio::time::sleep(Duration::from_millis(1500)).await;
        }

        registry.shutdown().await;

        assert_eq!(slow.firings.lock().len(), 3);
        assert_eq!(other.firings.lock().len(), 3);
        // Два слушателя одновременно, но никогда два запуска одного
        assert_eq!(slow.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(other.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(max_running_total.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated() {
        let failing = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let healthy = Arc::new(Recorder::default());

        let mut registry = ListenerRegistry::new();
        registry.subscribe("failing", [HintKind::Host], failing.clone());
        registry.subscribe("healthy", [HintKind::Host], healthy.clone());
        let stats = registry.stats();

        let mut state = DetectionState::default();
        registry.dispatch(&event(HintKind::Host, &mut state, host()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.dispatch(&event(
            HintKind::Host,
            &mut state,
            HintValue::Host(HostHint::new("linux", "other")),
        ));
        registry.shutdown().await;

        assert_eq!(healthy.firings.lock().len(), 2);
        let failing_stats = *stats.get("failing").unwrap();
        assert_eq!(
            failing_stats,
            ListenerStats {
                runs: 2,
                failures: 2,
                coalesced: 0
            }
        );
        assert_eq!(stats.get("healthy").unwrap().failures, 0);
    }

    /// Запоминает имена хостов, с которыми был вызван
    #[derive(Default)]
    struct Hosts {
        seen: Mutex<Vec<String>>,
        panic_on: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl Listener for Hosts {
        async fn on_hints(&self, _trigger: Option<HintKind>, values: &CorrelatedValues) -> Result<()> {
            let hostname = values.host().map(|h| h.hostname.clone()).unwrap_or_default();
            if self.panic_on == Some(hostname.as_str()) {
                panic!("обработчик упал на {}", hostname);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.seen.lock().push(hostname);
            Ok(())
        }
    }

    fn host_named(name: &str) -> HintValue {
        HintValue::Host(HostHint::new("linux", name))
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_firings_collapse_to_latest() {
        let hosts = Arc::new(Hosts::default());
        let mut registry = ListenerRegistry::new();
        registry.subscribe("hosts", [HintKind::Host], hosts.clone());
        let stats = registry.stats();

        let mut state = DetectionState::default();
        registry.dispatch(&event(HintKind::Host, &mut state, host_named("a")));
        tokio::time::sleep(Duration::from_millis(100)).await;
        // Пока "a" обрабатывается, приходят ещё три
        for name in ["b", "c", "d"] {
            registry.dispatch(&event(HintKind::Host, &mut state, host_named(name)));
        }
        registry.shutdown().await;

        assert_eq!(*hosts.seen.lock(), vec!["a", "d"]);
        let hosts_stats = *stats.get("hosts").unwrap();
        assert_eq!(hosts_stats.runs, 2);
        assert_eq!(hosts_stats.coalesced, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_handler_keeps_listener_alive() {
        let hosts = Arc::new(Hosts {
            panic_on: Some("broken"),
            ..Default::default()
        });
        let mut registry = ListenerRegistry::new();
        registry.subscribe("hosts", [HintKind::Host], hosts.clone());
        let stats = registry.stats();

        let mut state = DetectionState::default();
        assert_eq!(registry.dispatch(&event(HintKind::Host, &mut state, host_named("broken"))), 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.dispatch(&event(HintKind::Host, &mut state, host_named("box"))), 1);
        registry.shutdown().await;

        assert_eq!(*hosts.seen.lock(), vec!["box"]);
        let hosts_stats = *stats.get("hosts").unwrap();
        assert_eq!((hosts_stats.runs, hosts_stats.failures), (2, 1));
    }
}
