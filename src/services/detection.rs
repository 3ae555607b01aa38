//! DetectionAggregator: the single place that knows the current environment.
//!
//! Every hint source runs as its own task and forwards snapshots into one
//! fan-in task. The fan-in task keeps the latest value per category, drops
//! snapshots equal to the stored one and holds back all events until the
//! bootstrap gate opens.

use crate::app_error;
use crate::config::DetectionConfig;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::hints::{HintKind, HintValue};
use crate::services::sources::HintSource;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

const SOURCE_QUEUE: usize = 16;
const EVENT_QUEUE: usize = 64;

/// Последние известные значения по категориям.
///
/// Категория, получившая значение, больше не становится неизвестной:
/// значение только заменяется целиком.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionState {
    values: HashMap<HintKind, Arc<HintValue>>,
}

impl DetectionState {
    pub fn get(&self, kind: HintKind) -> Option<&Arc<HintValue>> {
        self.values.get(&kind)
    }

    pub fn is_known(&self, kind: HintKind) -> bool {
        self.values.contains_key(&kind)
    }

    /// Записать снимок, `false` если он совпадает с уже известным
    pub fn update(&mut self, kind: HintKind, value: HintValue) -> bool {
        if let Some(current) = self.values.get(&kind) {
            if **current == value {
                return false;
            }
        }
        self.values.insert(kind, Arc::new(value));
        true
    }

    pub fn known_kinds(&self) -> BTreeSet<HintKind> {
        self.values.keys().copied().collect()
    }
}

/// Событие для слушателей. `trigger == None` означает открытие шлюза запуска:
/// слушатели должны рассмотреть всё состояние сразу.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub trigger: Option<HintKind>,
    pub state: DetectionState,
}

/// Условие, при котором агрегатор начинает выпускать события после старта
#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapGate {
    pub timeout: Option<Duration>,
    pub wait_all: bool,
}

impl BootstrapGate {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            timeout: config.bootstrap_timeout(),
            wait_all: config.bootstrap_wait_all,
        }
    }

    fn is_open_at_start(&self) -> bool {
        self.timeout.is_none() && !self.wait_all
    }
}

enum SourceMessage {
    Update(HintValue),
    Stopped(HintKind),
}

pub struct DetectionAggregator {
    sources: Vec<Arc<dyn HintSource>>,
    connected: Vec<Arc<dyn HintSource>>,
    state: Arc<RwLock<DetectionState>>,
    gate: BootstrapGate,
    tasks: Vec<JoinHandle<()>>,
}

impl DetectionAggregator {
    pub fn new(sources: Vec<Arc<dyn HintSource>>, gate: BootstrapGate) -> Self {
        info!(
            "Инициализация DetectionAggregator: {} источник(ов), шлюз {:?}",
            sources.len(),
            gate
        );

        Self {
            sources,
            connected: Vec::new(),
            state: Arc::new(RwLock::new(DetectionState::default())),
            gate,
            tasks: Vec::new(),
        }
    }

    /// Подключить источники. Источник, который не смог подключиться, пропускается.
    pub async fn start(&mut self) -> Result<()> {
        for source in &self.sources {
            match source.connect().await {
                Ok(()) => {
                    info!("Источник '{}' подключён", source.kind());
                    self.connected.push(source.clone());
                }
                Err(e) => {
                    error!("Источник '{}' недоступен: {}", source.kind(), e);
                }
            }
        }

        if self.connected.is_empty() && !self.sources.is_empty() {
            return Err(app_error!(source_unavailable, "ни один источник подсказок не подключился"));
        }
        Ok(())
    }

    /// Запустить задачи источников и вернуть поток событий
    pub fn watch(&mut self) -> mpsc::Receiver<DetectionEvent> {
        let (raw_tx, raw_rx) = mpsc::channel(SOURCE_QUEUE * self.connected.len().max(1));
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        for source in &self.connected {
            self.tasks.push(Self::spawn_source(source.clone(), raw_tx.clone()));
        }
        drop(raw_tx);

        let expected = self.connected.iter().map(|s| s.kind()).collect();
        self.tasks.push(tokio::spawn(Self::fan_in(
            raw_rx,
            event_tx,
            self.state.clone(),
            self.gate,
            expected,
        )));

        event_rx
    }

    /// Разовый опрос всех источников в обход агрегации
    pub async fn query_all(&self) -> Vec<(HintKind, Result<HintValue>)> {
        let mut results = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            results.push((source.kind(), source.query().await));
        }
        results
    }

    /// Остановить задачи и освободить ресурсы всех подключённых источников
    pub async fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }

        for source in self.connected.drain(..) {
            source.disconnect().await;
            debug!("Источник '{}' отключён", source.kind());
        }
        info!("DetectionAggregator остановлен");
    }

    fn spawn_source(
        source: Arc<dyn HintSource>,
        raw_tx: mpsc::Sender<SourceMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let kind = source.kind();
            let (tx, mut rx) = mpsc::channel(SOURCE_QUEUE);

            let forward = async {
                while let Some(value) = rx.recv().await {
                    if raw_tx.send(SourceMessage::Update(value)).await.is_err() {
                        break;
                    }
                }
            };

            let (result, ()) = tokio::join!(source.watch(tx), forward);
            match result {
                Ok(()) => debug!("Источник '{}' завершил работу", kind),
                Err(e) => error!("Источник '{}' остановлен из-за ошибки: {}", kind, e),
            }

            let _ = raw_tx.send(SourceMessage::Stopped(kind)).await;
        })
    }

    async fn fan_in(
        mut raw_rx: mpsc::Receiver<SourceMessage>,
        event_tx: mpsc::Sender<DetectionEvent>,
        state: Arc<RwLock<DetectionState>>,
        gate: BootstrapGate,
        mut pending: BTreeSet<HintKind>,
    ) {
        let mut open = gate.is_open_at_start();
        let deadline = gate.timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let (trigger, snapshot) = tokio::select! {
                message = raw_rx.recv() => {
                    let Some(message) = message else { break };
                    let kind = match message {
                        SourceMessage::Update(value) => {
                            let kind = value.kind();
                            pending.remove(&kind);
                            let changed = update_state(&state, kind, value);
                            if !changed {
                                debug_if_enabled!("Снимок '{}' не изменился, событие подавлено", kind);
                                continue;
                            }
                            Some(kind)
                        }
                        SourceMessage::Stopped(kind) => {
                            if pending.remove(&kind) {
                                warn!("Источник '{}' завершился, не сообщив ни одного значения", kind);
                            }
                            None
                        }
                    };

                    if open {
                        match kind {
                            Some(kind) => (Some(kind), read_state(&state)),
                            None => continue,
                        }
                    } else if gate.wait_all && pending.is_empty() {
                        info!("Все источники сообщили значения, шлюз запуска открыт");
                        open = true;
                        (None, read_state(&state))
                    } else {
                        continue;
                    }
                }
                _ = gate_timer(deadline), if !open => {
                    info!("Истёк таймаут запуска, шлюз открыт");
                    open = true;
                    (None, read_state(&state))
                }
            };

            debug!(
                "Событие обнаружения: {} (известно: {:?})",
                trigger.map_or("bootstrap", |k| k.as_str()),
                snapshot.known_kinds()
            );

            if event_tx
                .send(DetectionEvent {
                    trigger,
                    state: snapshot,
                })
                .await
                .is_err()
            {
                debug!("Получатель событий закрыт, агрегатор завершает работу");
                break;
            }
        }
    }
}

fn update_state(state: &RwLock<DetectionState>, kind: HintKind, value: HintValue) -> bool {
    state.write().update(kind, value)
}

fn read_state(state: &RwLock<DetectionState>) -> DetectionState {
    state.read().clone()
}

async fn gate_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl Drop for DetectionAggregator {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::{HostHint, WifiHint};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::timeout;

    /// Отдаёт значения по сценарию, затем повторяет последнее. `None` в сценарии - ошибка запроса.
    struct ScriptedSource {
        kind: HintKind,
        script: Mutex<VecDeque<Option<HintValue>>>,
        last: Mutex<Option<HintValue>>,
        interval: Duration,
        disconnected: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(kind: HintKind, script: Vec<Option<HintValue>>, interval: Duration) -> Self {
            Self {
                kind,
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                interval,
                disconnected: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait::async_trait]
    impl HintSource for ScriptedSource {
        fn kind(&self) -> HintKind {
            self.kind
        }

        async fn disconnect(&self) {
            self.disconnected.store(true, Ordering::SeqCst);
        }

        async fn query(&self) -> Result<HintValue> {
            let next = self.script.lock().pop_front();
            match next {
                Some(Some(value)) => {
                    *self.last.lock() = Some(value.clone());
                    Ok(value)
                }
                Some(None) => Err(app_error!(source_unavailable, "сбой по сценарию")),
                None => self
                    .last
                    .lock()
                    .clone()
                    .ok_or_else(|| app_error!(internal, "сценарий пуст")),
            }
        }

        fn poll_interval(&self) -> Duration {
            self.interval
        }
    }

    fn host(name: &str) -> HintValue {
        HintValue::Host(HostHint::new("linux", name))
    }

    fn wifi(networks: Vec<WifiHint>) -> HintValue {
        HintValue::Wifi(networks)
    }

    fn no_gate() -> BootstrapGate {
        BootstrapGate::default()
    }

    async fn started(sources: Vec<Arc<dyn HintSource>>, gate: BootstrapGate) -> (DetectionAggregator, mpsc::Receiver<DetectionEvent>) {
        let mut aggregator = DetectionAggregator::new(sources, gate);
        aggregator.start().await.unwrap();
        let rx = aggregator.watch();
        (aggregator, rx)
    }

    #[test]
    fn test_state_update_suppresses_equal_values() {
        let mut state = DetectionState::default();
        assert!(!state.is_known(HintKind::Host));

        assert!(state.update(HintKind::Host, host("box")));
        assert!(!state.update(HintKind::Host, host("box")));
        assert!(state.update(HintKind::Host, host("other")));
        assert!(state.is_known(HintKind::Host));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_value_twice_emits_once() {
        let source = ScriptedSource::new(
            HintKind::Host,
            vec![Some(host("box")), Some(host("box"))],
            Duration::from_secs(1),
        );
        let (mut aggregator, mut rx) = started(vec![Arc::new(source)], no_gate()).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.trigger, Some(HintKind::Host));

        let next = timeout(Duration::from_secs(30), rx.recv()).await;
        assert!(next.is_err(), "повторное значение не должно порождать событие");

        aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wifi_change_emits_exactly_one_update() {
        let home = WifiHint::new("wlan0").with_ssid("home").with_mac("aa:bb");
        let source = ScriptedSource::new(
            HintKind::Wifi,
            vec![
                Some(wifi(vec![])),
                Some(wifi(vec![home.clone()])),
                Some(wifi(vec![home.clone()])),
            ],
            Duration::from_secs(10),
        );
        let (mut aggregator, mut rx) = started(vec![Arc::new(source)], no_gate()).await;

        let initial = rx.recv().await.unwrap();
        let wifi_value = initial.state.get(HintKind::Wifi).unwrap();
        assert_eq!(wifi_value.as_wifi(), Some(&[][..]));

        let changed = rx.recv().await.unwrap();
        assert_eq!(changed.trigger, Some(HintKind::Wifi));
        let wifi_value = changed.state.get(HintKind::Wifi).unwrap();
        assert_eq!(wifi_value.as_wifi(), Some(&[home][..]));

        let third = timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(third.is_err());

        aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_timeout_holds_events() {
        let start = Instant::now();
        let sources: Vec<Arc<dyn HintSource>> = vec![
            Arc::new(ScriptedSource::new(
                HintKind::Host,
                vec![Some(host("box"))],
                Duration::from_secs(1),
            )),
            Arc::new(ScriptedSource::new(
                HintKind::Wifi,
                vec![Some(wifi(vec![])), Some(wifi(vec![])), Some(wifi(vec![WifiHint::new("wlan0")]))],
                Duration::from_secs(4),
            )),
        ];
        let gate = BootstrapGate {
            timeout: Some(Duration::from_secs(5)),
            wait_all: false,
        };
        let (mut aggregator, mut rx) = started(sources, gate).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.trigger, None);
        assert!(Instant::now() - start >= Duration::from_secs(5));
        assert!(first.state.is_known(HintKind::Host));
        assert!(first.state.is_known(HintKind::Wifi));

        // Третий опрос wifi (t = 8s) уже после открытия шлюза
        let second = rx.recv().await.unwrap();
        assert_eq!(second.trigger, Some(HintKind::Wifi));

        aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_all_tolerates_failed_source() {
        let sources: Vec<Arc<dyn HintSource>> = vec![
            Arc::new(ScriptedSource::new(HintKind::Wifi, vec![None], Duration::from_secs(1))),
            Arc::new(ScriptedSource::new(
                HintKind::Host,
                vec![Some(host("box"))],
                Duration::from_secs(1),
            )),
        ];
        let gate = BootstrapGate {
            timeout: None,
            wait_all: true,
        };
        let (mut aggregator, mut rx) = started(sources, gate).await;

        let event = timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.trigger, None);
        assert!(event.state.is_known(HintKind::Host));
        assert!(!event.state.is_known(HintKind::Wifi));

        aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_disconnects_sources() {
        let source = ScriptedSource::new(HintKind::Host, vec![None], Duration::from_secs(1));
        let disconnected = source.disconnected.clone();
        let (mut aggregator, _rx) = started(vec![Arc::new(source)], no_gate()).await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        aggregator.stop().await;

        assert!(disconnected.load(Ordering::SeqCst));
    }
}
