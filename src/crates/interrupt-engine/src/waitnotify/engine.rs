use super::{CorrelationKey, NotifyCallback, Resolution, WaitNotifyEngine};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// How long a resolution nobody has claimed is kept for a late `register` or `wait_for`
pub const DEFAULT_PARKED_TTL: Duration = Duration::from_secs(300);

struct Registration {
    id: u64,
    callback: Arc<dyn NotifyCallback>,
    timer: Option<JoinHandle<()>>,
}

impl Registration {
    fn disarm(self) -> Arc<dyn NotifyCallback> {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        self.callback
    }
}

/// Everything known about one key; all transitions go through `DashMap::entry`
enum Slot {
    Waiting {
        registration: Option<Registration>,
        listeners: Vec<oneshot::Sender<Resolution>>,
    },
    /// Resolved before anyone claimed it; evicted by `timer` after the TTL
    Parked {
        id: u64,
        resolution: Resolution,
        timer: JoinHandle<()>,
    },
}

impl Slot {
    fn is_claimed(&self) -> bool {
        match self {
            Slot::Waiting {
                registration,
                listeners,
            } => registration.is_some() || listeners.iter().any(|tx| !tx.is_closed()),
            Slot::Parked { .. } => false,
        }
    }

    fn take_parked(self) -> Option<Resolution> {
        match self {
            Slot::Parked {
                resolution, timer, ..
            } => {
                timer.abort();
                Some(resolution)
            }
            Slot::Waiting { .. } => None,
        }
    }

    fn into_waiters(self) -> (Option<Registration>, Vec<oneshot::Sender<Resolution>>) {
        match self {
            Slot::Waiting {
                registration,
                listeners,
            } => (registration, listeners),
            Slot::Parked { timer, .. } => {
                timer.abort();
                (None, Vec::new())
            }
        }
    }
}

fn send_all(listeners: Vec<oneshot::Sender<Resolution>>, resolution: &Resolution) -> usize {
    listeners
        .into_iter()
        .map(|tx| tx.send(resolution.clone()).is_ok())
        .filter(|sent| *sent)
        .count()
}

struct Inner {
    next_id: AtomicU64,
    parked_ttl: Duration,
    slots: DashMap<CorrelationKey, Slot>,
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn expire(&self, key: &CorrelationKey, registration_id: u64) {
        // A resolution or re-registration that won the race replaced our entry
        let removed = self.slots.remove_if(key, |_, slot| {
            matches!(slot, Slot::Waiting { registration: Some(r), .. } if r.id == registration_id)
        });
        let Some((_, slot)) = removed else {
            return;
        };
        let (registration, listeners) = slot.into_waiters();

        debug!(key = %key, "Wait deadline elapsed");
        send_all(listeners, &Resolution::TimedOut);
        if let Some(registration) = registration {
            dispatch(registration.callback, key, Resolution::TimedOut).await;
        }
    }

    fn evict(&self, key: &CorrelationKey, parked_id: u64) {
        let removed = self
            .slots
            .remove_if(key, |_, slot| matches!(slot, Slot::Parked { id, .. } if *id == parked_id));
        if removed.is_some() {
            debug!(key = %key, "Unclaimed resolution evicted");
        }
    }
}

async fn dispatch(callback: Arc<dyn NotifyCallback>, key: &CorrelationKey, resolution: Resolution) {
    match resolution {
        Resolution::Done(payload) => callback.notify(payload).await,
        Resolution::Failed(payload) => callback.notify_error(payload).await,
        Resolution::TimedOut => {
            callback
                .notify_timeout(json!({ "key": key.as_str(), "reason": "timeout" }))
                .await
        }
    }
}

/// Process-local wait/notify engine
///
/// Deadlines and parked-resolution eviction run on spawned tokio timers, so
/// the engine must be driven from within a runtime.
#[derive(Clone)]
pub struct InMemoryWaitNotifyEngine {
    inner: Arc<Inner>,
}

impl Default for InMemoryWaitNotifyEngine {
    fn default() -> Self {
        Self::with_parked_ttl(DEFAULT_PARKED_TTL)
    }
}

impl InMemoryWaitNotifyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parked_ttl(parked_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                parked_ttl,
                slots: DashMap::new(),
            }),
        }
    }

    /// Whether a callback is still waiting on `key`
    pub fn is_registered(&self, key: &CorrelationKey) -> bool {
        self.inner.slots.get(key).is_some_and(|slot| {
            matches!(*slot, Slot::Waiting { registration: Some(_), .. })
        })
    }

    /// Number of callbacks still waiting
    pub fn pending(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Waiting { registration: Some(_), .. }))
            .count()
    }

    /// Number of resolutions held for a late claimant
    pub fn parked(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Parked { .. }))
            .count()
    }

    fn spawn_timer(&self, key: CorrelationKey, registration_id: u64, timeout: Duration) -> JoinHandle<()> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(&key, registration_id).await;
            }
        })
    }

    fn park(&self, key: &CorrelationKey, resolution: Resolution) -> Slot {
        let id = self.inner.next_id();
        let ttl = self.inner.parked_ttl;
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let evict_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = inner.upgrade() {
                inner.evict(&evict_key, id);
            }
        });
        Slot::Parked {
            id,
            resolution,
            timer,
        }
    }

    async fn resolve(&self, key: &CorrelationKey, resolution: Resolution) {
        let (registration, listeners) = match self.inner.slots.entry(key.clone()) {
            Entry::Occupied(entry) if entry.get().is_claimed() => entry.remove().into_waiters(),
            Entry::Occupied(mut entry) => {
                trace!(key = %key, "No waiter yet, parking resolution");
                // Replaces an older parked result or a slot whose listeners all went away
                let _ = entry.insert(self.park(key, resolution)).into_waiters();
                return;
            }
            Entry::Vacant(entry) => {
                trace!(key = %key, "No waiter yet, parking resolution");
                entry.insert(self.park(key, resolution));
                return;
            }
        };

        send_all(listeners, &resolution);
        if let Some(registration) = registration {
            dispatch(registration.disarm(), key, resolution).await;
        }
    }
}

#[async_trait]
impl WaitNotifyEngine for InMemoryWaitNotifyEngine {
    async fn register(
        &self,
        key: &CorrelationKey,
        callback: Arc<dyn NotifyCallback>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let resolved = match self.inner.slots.entry(key.clone()) {
            Entry::Occupied(entry) if matches!(entry.get(), Slot::Parked { .. }) => {
                entry.remove().take_parked().map(|resolution| (callback, resolution))
            }
            Entry::Occupied(mut entry) => {
                let id = self.inner.next_id();
                let registration = Registration {
                    id,
                    callback,
                    timer: timeout.map(|timeout| self.spawn_timer(key.clone(), id, timeout)),
                };
                if let Slot::Waiting {
                    registration: current,
                    ..
                } = entry.get_mut()
                {
                    if let Some(previous) = current.replace(registration) {
                        debug!(key = %key, "Replacing earlier registration");
                        previous.disarm();
                    }
                }
                None
            }
            Entry::Vacant(entry) => {
                let id = self.inner.next_id();
                let registration = Registration {
                    id,
                    callback,
                    timer: timeout.map(|timeout| self.spawn_timer(key.clone(), id, timeout)),
                };
                entry.insert(Slot::Waiting {
                    registration: Some(registration),
                    listeners: Vec::new(),
                });
                None
            }
        };

        if let Some((callback, resolution)) = resolved {
            debug!(key = %key, "Key already resolved, dispatching immediately");
            dispatch(callback, key, resolution).await;
        }
        Ok(())
    }

    async fn done_with(&self, key: &CorrelationKey, payload: Value) -> Result<()> {
        self.resolve(key, Resolution::Done(payload)).await;
        Ok(())
    }

    async fn fail_with(&self, key: &CorrelationKey, payload: Value) -> Result<()> {
        self.resolve(key, Resolution::Failed(payload)).await;
        Ok(())
    }

    fn wait_for(&self, key: &CorrelationKey) -> oneshot::Receiver<Resolution> {
        let (tx, rx) = oneshot::channel();
        match self.inner.slots.entry(key.clone()) {
            Entry::Occupied(entry) if matches!(entry.get(), Slot::Parked { .. }) => {
                if let Some(resolution) = entry.remove().take_parked() {
                    let _ = tx.send(resolution);
                }
            }
            Entry::Occupied(mut entry) => {
                if let Slot::Waiting { listeners, .. } = entry.get_mut() {
                    listeners.retain(|listener| !listener.is_closed());
                    listeners.push(tx);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::Waiting {
                    registration: None,
                    listeners: vec![tx],
                });
            }
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl NotifyCallback for Recorder {
        async fn notify(&self, _payload: Value) {
            self.calls.lock().push("notify");
        }

        async fn notify_error(&self, _payload: Value) {
            self.calls.lock().push("error");
        }

        async fn notify_timeout(&self, _payload: Value) {
            self.calls.lock().push("timeout");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_before_deadline_suppresses_timeout() {
        let engine = InMemoryWaitNotifyEngine::new();
        let recorder = Arc::new(Recorder::default());
        let key = CorrelationKey::new("k");

        engine
            .register(&key, recorder.clone(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        engine.done_with(&key, json!({"ok": true})).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(*recorder.calls.lock(), vec!["notify"]);
        assert!(!engine.is_registered(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_timeout_once() {
        let engine = InMemoryWaitNotifyEngine::new();
        let recorder = Arc::new(Recorder::default());
        let key = CorrelationKey::new("k");

        engine
            .register(&key, recorder.clone(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        engine.done_with(&key, json!({})).await.unwrap();

        assert_eq!(*recorder.calls.lock(), vec!["timeout"]);

        // The late ack is held only until the parked TTL runs out
        assert_eq!(engine.parked(), 1);
        tokio::time::sleep(DEFAULT_PARKED_TTL + Duration::from_secs(1)).await;
        assert_eq!(engine.parked(), 0);
        assert_eq!(*recorder.calls.lock(), vec!["timeout"]);
    }

    #[tokio::test]
    async fn test_parked_resolution_reaches_late_listener() {
        let engine = InMemoryWaitNotifyEngine::new();
        let key = CorrelationKey::completion("node-1", "int-1");
        assert_eq!(key.as_str(), "node-1|int-1");

        engine.fail_with(&key, json!({"error": "boom"})).await.unwrap();
        let resolution = engine.wait_for(&key).await.unwrap();
        assert_eq!(resolution, Resolution::Failed(json!({"error": "boom"})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclaimed_resolutions_are_evicted() {
        let engine = InMemoryWaitNotifyEngine::with_parked_ttl(Duration::from_secs(30));
        for n in 0..1001 {
            let key = CorrelationKey::completion(&format!("node-{n}"), "int-1");
            engine.done_with(&key, json!({"n": n})).await.unwrap();
        }
        assert_eq!(engine.parked(), 1001);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let key = CorrelationKey::completion("node-7", "int-1");
        assert_eq!(engine.wait_for(&key).await.unwrap(), Resolution::Done(json!({"n": 7})));
        assert_eq!(engine.parked(), 1000);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(engine.parked(), 0);

        // A claimant arriving after eviction waits like any other
        let recorder = Arc::new(Recorder::default());
        let key = CorrelationKey::completion("node-8", "int-1");
        engine.register(&key, recorder.clone(), None).await.unwrap();
        assert!(engine.is_registered(&key));
        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_resolution_replaces_parked_one() {
        let engine = InMemoryWaitNotifyEngine::with_parked_ttl(Duration::from_secs(30));
        let key = CorrelationKey::new("k");

        engine.fail_with(&key, json!({"attempt": 1})).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        engine.done_with(&key, json!({"attempt": 2})).await.unwrap();

        // The first entry's eviction must not drop the replacement
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(engine.parked(), 1);
        assert_eq!(
            engine.wait_for(&key).await.unwrap(),
            Resolution::Done(json!({"attempt": 2}))
        );
        assert_eq!(engine.parked(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_register_and_resolve_notify_once() {
        let engine = InMemoryWaitNotifyEngine::new();
        let recorders: Vec<Arc<Recorder>> = (0..200).map(|_| Arc::new(Recorder::default())).collect();

        let mut tasks = Vec::new();
        for (n, recorder) in recorders.iter().enumerate() {
            let key = CorrelationKey::new(format!("k-{n}"));
            let registering = engine.clone();
            let callback = recorder.clone();
            let register_key = key.clone();
            tasks.push(tokio::spawn(async move {
                registering
                    .register(&register_key, callback, Some(Duration::from_secs(60)))
                    .await
                    .unwrap();
            }));
            let resolving = engine.clone();
            tasks.push(tokio::spawn(async move {
                resolving.done_with(&key, json!({})).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for recorder in &recorders {
            assert_eq!(*recorder.calls.lock(), vec!["notify"]);
        }
        assert_eq!(engine.pending(), 0);
        assert_eq!(engine.parked(), 0);
    }
}
