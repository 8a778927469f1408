//! Owns the kernel watch registry, maps raw kernel events to canonical
//! events, buffers Shadow Index mutations, dispatches events to the
//! consumer, and runs the reconciliation protocol.

pub mod event_map;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::error::{EngineError, Result};
use crate::scanner::PathScanner;
use crate::scanner::fs::RealFs;
use crate::shadow_index::ShadowIndexStore;
use crate::types::{CanonicalEventKind, ShadowKey, SOURCE_LIVE, SOURCE_RECONCILIATION, SourceTag};

/// A bitwise-OR subset of canonical event kinds a consumer has subscribed
/// to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventMask(u8);

impl EventMask {
    pub const CREATED: EventMask = EventMask(1 << 0);
    pub const MODIFIED: EventMask = EventMask(1 << 1);
    pub const DELETED: EventMask = EventMask(1 << 2);
    pub const MONITORED_DIR_MOVED: EventMask = EventMask(1 << 3);
    pub const DROPPED_EVENTS: EventMask = EventMask(1 << 4);
    pub const ALL: EventMask = EventMask(0b1_1111);

    pub fn contains(&self, kind: CanonicalEventKind) -> bool {
        self.0 & Self::bit_for(kind) != 0
    }

    fn bit_for(kind: CanonicalEventKind) -> u8 {
        match kind {
            CanonicalEventKind::Created => Self::CREATED.0,
            CanonicalEventKind::Modified => Self::MODIFIED.0,
            CanonicalEventKind::Deleted => Self::DELETED.0,
            CanonicalEventKind::MonitoredDirMoved => Self::MONITORED_DIR_MOVED.0,
            CanonicalEventKind::DroppedEvents => Self::DROPPED_EVENTS.0,
        }
    }
}

impl std::ops::BitOr for EventMask {
    type Output = EventMask;
    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

/// Consumer callback: `(monitored_root, event_path, kind, source_tag)`.
pub type ConsumerCallback = Arc<dyn Fn(&Path, &Path, CanonicalEventKind, SourceTag) + Send + Sync>;

struct MonitoredRoot {
    path: PathBuf,
    event_mask: EventMask,
    monitoring: bool,
    /// Kept alive to hold the kernel registration; dropping it tears down
    /// the watch. `notify`'s recursive watch is a single registration that
    /// internally tracks one descriptor per descendant directory, so unlike
    /// the original's explicit `watch_descriptors` map, that bookkeeping is
    /// private to the watcher object itself.
    _watcher: Option<RecommendedWatcher>,
}

#[derive(Default)]
struct PendingBuffers {
    created: HashMap<PathBuf, Vec<crate::types::ShadowRow>>,
    modified: HashMap<PathBuf, Vec<crate::types::ShadowRow>>,
    deleted: HashMap<PathBuf, Vec<ShadowKey>>,
}

enum WatchMessage {
    Event(Event),
    Error(String),
}

/// Whether reconciliation at add-time replays the offline gap as synthetic
/// events (persistent) or merely seeds the Shadow Index silently
/// (non-persistent).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconciliationMode {
    Persistent,
    NonPersistent,
}

/// Owns monitored roots, the pending Shadow Index mutation buffers, and the
/// add/remove request queues; runs the producer (kernel event) and service
/// (flush) loops.
pub struct FsMonitorCore {
    shadow: Arc<dyn ShadowIndexStore>,
    scanner: Arc<PathScanner<RealFs>>,
    config: WatchConfig,
    mode: ReconciliationMode,
    ignored_prefixes: Vec<PathBuf>,
    callback: ConsumerCallback,

    roots: Arc<RwLock<HashMap<PathBuf, MonitoredRoot>>>,
    pending: Arc<Mutex<PendingBuffers>>,

    add_tx: mpsc::Sender<(PathBuf, EventMask)>,
    add_rx: Mutex<Option<mpsc::Receiver<(PathBuf, EventMask)>>>,
    remove_tx: mpsc::Sender<PathBuf>,
    remove_rx: Mutex<Option<mpsc::Receiver<PathBuf>>>,
    watch_event_tx: mpsc::Sender<WatchMessage>,
    watch_event_rx: Mutex<Option<mpsc::Receiver<WatchMessage>>>,

    /// Cooperative shutdown signal. A `watch` channel (rather than a
    /// one-shot `Notify`) so a loop that hasn't reached its `select!` yet at
    /// the moment `stop()` sends still observes the change on its next poll
    /// -- no wakeup can be missed the way it could with `Notify::notify_waiters`.
    shutdown_tx: watch::Sender<bool>,
    producer_handle: Mutex<Option<JoinHandle<()>>>,
    service_handle: Mutex<Option<JoinHandle<()>>>,
}

impl FsMonitorCore {
    pub fn new(
        shadow: Arc<dyn ShadowIndexStore>,
        config: WatchConfig,
        mode: ReconciliationMode,
        ignored_prefixes: Vec<PathBuf>,
        callback: ConsumerCallback,
    ) -> Arc<Self> {
        let (add_tx, add_rx) = mpsc::channel(config.request_channel_capacity);
        let (remove_tx, remove_rx) = mpsc::channel(config.request_channel_capacity);
        let (watch_event_tx, watch_event_rx) = mpsc::channel(config.request_channel_capacity * 4);
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        Arc::new(Self {
            shadow,
            scanner: Arc::new(PathScanner::new(RealFs)),
            config,
            mode,
            ignored_prefixes,
            callback,
            roots: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(Mutex::new(PendingBuffers::default())),
            add_tx,
            add_rx: Mutex::new(Some(add_rx)),
            remove_tx,
            remove_rx: Mutex::new(Some(remove_rx)),
            watch_event_tx,
            watch_event_rx: Mutex::new(Some(watch_event_rx)),
            shutdown_tx,
            producer_handle: Mutex::new(None),
            service_handle: Mutex::new(None),
        })
    }

    /// Enqueue a registration; the service loop installs a recursive watch
    /// and performs reconciliation.
    pub async fn add(&self, path: PathBuf, event_mask: EventMask) -> Result<()> {
        self.add_tx
            .send((path, event_mask))
            .await
            .map_err(|_| EngineError::Internal("monitor add queue closed".into()))
    }

    /// Enqueue an unregistration; the service loop removes all descendant
    /// watches.
    pub async fn remove(&self, path: PathBuf) -> Result<()> {
        self.remove_tx
            .send(path)
            .await
            .map_err(|_| EngineError::Internal("monitor remove queue closed".into()))
    }

    /// Start the producer and service tasks. Idempotent: a second call is a
    /// no-op once the receivers have been taken.
    pub async fn start(self: &Arc<Self>) {
        let watch_event_rx = self.watch_event_rx.lock().await.take();
        if let Some(rx) = watch_event_rx {
            *self.producer_handle.lock().await = Some(self.spawn_producer(rx));
        }

        let add_rx = self.add_rx.lock().await.take();
        let remove_rx = self.remove_rx.lock().await.take();
        if let (Some(add_rx), Some(remove_rx)) = (add_rx, remove_rx) {
            *self.service_handle.lock().await = Some(self.spawn_service(add_rx, remove_rx));
        }
    }

    /// Sets the termination flag, signals both loops to stop at their next
    /// poll, and unregisters every watch. Shutdown is purely cooperative --
    /// the loops observe `shutdown_tx` and return on their own, so an
    /// in-flight callback invocation (and an in-flight `flush_pending` bulk
    /// call) always runs to completion; no events fire after this returns.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.producer_handle.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.service_handle.lock().await.take() {
            let _ = handle.await;
        }

        let mut roots = self.roots.write().await;
        roots.clear(); // dropping MonitoredRoot drops its watcher, tearing down the kernel registration
    }

    fn spawn_producer(self: &Arc<Self>, mut rx: mpsc::Receiver<WatchMessage>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut shutdown_rx = this.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(WatchMessage::Event(event)) => this.handle_kernel_event(event).await,
                            Some(WatchMessage::Error(err)) => {
                                warn!("watch backend error: {err}");
                                this.dispatch_dropped_events().await;
                            }
                            None => break,
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    }

    fn spawn_service(
        self: &Arc<Self>,
        mut add_rx: mpsc::Receiver<(PathBuf, EventMask)>,
        mut remove_rx: mpsc::Receiver<PathBuf>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut shutdown_rx = this.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(
                this.config.service_tick_ms,
            ));
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                if let Ok((path, mask)) = add_rx.try_recv() {
                    if let Err(err) = this.install_and_reconcile(path.clone(), mask).await {
                        error!("failed to install watch for {}: {err}", path.display());
                    }
                }

                // Drains the *remove* queue -- the original source drains
                // `add_queue` here by mistake; spec §9 calls this out as a
                // defect to fix, not to preserve.
                if let Ok(path) = remove_rx.try_recv() {
                    this.uninstall(&path).await;
                }

                this.flush_pending().await;
            }
        })
    }

    async fn install_and_reconcile(&self, path: PathBuf, event_mask: EventMask) -> Result<()> {
        let watcher = self.install_watch(&path)?;

        {
            let mut roots = self.roots.write().await;
            roots.insert(
                path.clone(),
                MonitoredRoot {
                    path: path.clone(),
                    event_mask,
                    monitoring: false,
                    _watcher: Some(watcher),
                },
            );
        }

        match self.mode {
            ReconciliationMode::Persistent => self.reconcile_persistent(&path, event_mask).await?,
            ReconciliationMode::NonPersistent => {
                // Seeding still runs through `diff_scan` (against an empty
                // store this is equivalent to a full walk) so ignored
                // subtrees are excluded the same way the live path excludes
                // them; no synthetic events are ever raised here.
                let mut diff = self.scanner.diff_scan(self.shadow.as_ref(), &path).await?;
                self.drop_ignored(&mut diff);
                self.scanner.apply_diff(self.shadow.as_ref(), &path, &diff).await?;
            }
        }

        if let Some(root) = self.roots.write().await.get_mut(&path) {
            root.monitoring = true;
        }
        info!("now monitoring {}", path.display());
        Ok(())
    }

    fn install_watch(&self, path: &Path) -> Result<RecommendedWatcher> {
        let tx = self.watch_event_tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.blocking_send(WatchMessage::Event(event));
                }
                Err(err) => {
                    let _ = tx.blocking_send(WatchMessage::Error(err.to_string()));
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| EngineError::WatchInstallFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| EngineError::WatchInstallFailure {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(watcher)
    }

    /// Runs `diff_scan` against the Shadow Index, applies the resulting
    /// deltas, and synthesizes a canonical event per entry -- this happens
    /// before any live kernel event for `path` is delivered.
    async fn reconcile_persistent(&self, path: &Path, event_mask: EventMask) -> Result<()> {
        let mut diff = self.scanner.diff_scan(self.shadow.as_ref(), path).await?;
        self.drop_ignored(&mut diff);
        if diff.is_empty() {
            return Ok(());
        }

        self.scanner.apply_diff(self.shadow.as_ref(), path, &diff).await?;

        if event_mask.contains(CanonicalEventKind::Created) {
            for row in &diff.created {
                self.dispatch(path, &row.path(), CanonicalEventKind::Created, SOURCE_RECONCILIATION);
            }
        }
        if event_mask.contains(CanonicalEventKind::Modified) {
            for row in &diff.modified {
                self.dispatch(path, &row.path(), CanonicalEventKind::Modified, SOURCE_RECONCILIATION);
            }
        }
        if event_mask.contains(CanonicalEventKind::Deleted) {
            for key in &diff.deleted {
                let event_path = Path::new(&key.parent_dir).join(&key.name);
                self.dispatch(path, &event_path, CanonicalEventKind::Deleted, SOURCE_RECONCILIATION);
            }
        }

        debug!(
            "reconciled {}: {} created, {} modified, {} deleted",
            path.display(),
            diff.created.len(),
            diff.modified.len(),
            diff.deleted.len()
        );
        Ok(())
    }

    /// Invokes the consumer callback, catching a panicking callback so one
    /// misbehaving consumer cannot take down the producer task.
    fn dispatch(&self, root: &Path, path: &Path, kind: CanonicalEventKind, source: SourceTag) {
        let callback = &self.callback;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback(root, path, kind, source);
        }));
        if result.is_err() {
            error!(
                "consumer callback panicked handling {:?} for {}",
                kind,
                path.display()
            );
        }
    }

    async fn uninstall(&self, path: &Path) {
        if self.roots.write().await.remove(path).is_some() {
            info!("stopped monitoring {}", path.display());
        }
    }

    /// `true` if `event_path` is the ignored directory itself or lies
    /// beneath one.
    fn is_ignored(&self, event_path: &Path) -> bool {
        self.ignored_prefixes
            .iter()
            .any(|prefix| event_path.starts_with(prefix))
    }

    /// Strips entries under an ignored prefix from a scan diff, so neither
    /// the Shadow Index nor the consumer callback ever observe them.
    fn drop_ignored(&self, diff: &mut crate::types::DiffResult) {
        if self.ignored_prefixes.is_empty() {
            return;
        }
        diff.created.retain(|row| !self.is_ignored(&row.path()));
        diff.modified.retain(|row| !self.is_ignored(&row.path()));
        diff.deleted
            .retain(|key| !self.is_ignored(&Path::new(&key.parent_dir).join(&key.name)));
    }

    async fn resolve_root(&self, path: &Path) -> Option<(PathBuf, EventMask)> {
        let roots = self.roots.read().await;
        roots
            .values()
            .filter(|root| path.starts_with(&root.path))
            .max_by_key(|root| root.path.as_os_str().len())
            .map(|root| (root.path.clone(), root.event_mask))
    }

    async fn handle_kernel_event(&self, event: Event) {
        let Some(primary) = event.paths.first().cloned() else {
            return;
        };
        let parent_dir = primary.parent().unwrap_or(&primary).to_path_buf();

        if self.is_ignored(&primary) {
            return;
        }

        let Some((root, event_mask)) = self.resolve_root(&primary).await else {
            return;
        };

        // The watched root itself moving is a distinct signal from an
        // ordinary descendant rename -- both arrive from `notify` as
        // `Modify(Name(_))`, so the path has to be checked against the root
        // before falling through to the generic classification.
        let kind = if primary == root && event_map::is_rename(&event.kind) {
            CanonicalEventKind::MonitoredDirMoved
        } else {
            let Some(kind) = event_map::classify(&event.kind) else {
                debug!("unclassified kernel event: {:?}", event.kind);
                return;
            };
            kind
        };

        match kind {
            CanonicalEventKind::MonitoredDirMoved | CanonicalEventKind::DroppedEvents => {
                // Informational only -- do not touch the Shadow Index.
                if event_mask.contains(kind) {
                    self.dispatch(&root, &primary, kind, SOURCE_LIVE);
                }
                return;
            }
            _ => {}
        }

        let row_or_key = if kind == CanonicalEventKind::Deleted {
            None
        } else {
            match tokio::fs::symlink_metadata(&primary).await {
                Ok(meta) => {
                    let parent_dir_str = parent_dir.to_string_lossy().to_string();
                    let name = primary
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    let mtime = if meta.is_dir() {
                        crate::types::ShadowRow::DIR_MTIME
                    } else {
                        meta.modified()
                            .ok()
                            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                            .map(|d| d.as_secs() as i64)
                            .unwrap_or(0)
                    };
                    Some(crate::types::ShadowRow {
                        root: root.to_string_lossy().to_string(),
                        parent_dir: parent_dir_str,
                        name,
                        mtime,
                    })
                }
                Err(err) => {
                    debug!("stat failed for {}: {err}, dropping event", primary.display());
                    return;
                }
            }
        };

        {
            let mut pending = self.pending.lock().await;
            match kind {
                CanonicalEventKind::Created => {
                    if let Some(row) = row_or_key {
                        pending.created.entry(root.clone()).or_default().push(row);
                    }
                }
                CanonicalEventKind::Modified => {
                    if let Some(row) = row_or_key {
                        pending.modified.entry(root.clone()).or_default().push(row);
                    }
                }
                CanonicalEventKind::Deleted => {
                    let parent_dir_str = parent_dir.to_string_lossy().to_string();
                    let name = primary
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    pending.deleted.entry(root.clone()).or_default().push(ShadowKey {
                        parent_dir: parent_dir_str,
                        name,
                    });
                }
                _ => unreachable!(),
            }
        }

        if event_mask.contains(kind) {
            self.dispatch(&root, &primary, kind, SOURCE_LIVE);
        }
    }

    async fn dispatch_dropped_events(&self) {
        let roots: Vec<(PathBuf, EventMask)> = self
            .roots
            .read()
            .await
            .values()
            .map(|r| (r.path.clone(), r.event_mask))
            .collect();
        for (root, mask) in roots {
            if mask.contains(CanonicalEventKind::DroppedEvents) {
                self.dispatch(&root, &root, CanonicalEventKind::DroppedEvents, SOURCE_LIVE);
            }
        }
    }

    /// Flushes `pending_created` / `pending_modified` / `pending_deleted` to
    /// the Shadow Index via bulk calls; clears each buffer after a
    /// successful flush. On `ShadowIndexIo`, the buffer for that root is
    /// left intact so the next tick retries it (spec §7: "events continue
    /// to be delivered but index drifts" until the retry succeeds).
    async fn flush_pending(&self) {
        let mut pending = self.pending.lock().await;

        let mut flushed_created = Vec::new();
        for (root, rows) in pending.created.iter() {
            if self.shadow.add_files(rows).await.is_ok() {
                flushed_created.push(root.clone());
            } else {
                error!("shadow index add_files failed for {}, retrying next tick", root.display());
            }
        }
        for root in flushed_created {
            pending.created.remove(&root);
        }

        let mut flushed_modified = Vec::new();
        for (root, rows) in pending.modified.iter() {
            if self.shadow.update_files(rows).await.is_ok() {
                flushed_modified.push(root.clone());
            } else {
                error!("shadow index update_files failed for {}, retrying next tick", root.display());
            }
        }
        for root in flushed_modified {
            pending.modified.remove(&root);
        }

        let mut flushed_deleted = Vec::new();
        for (root, keys) in pending.deleted.iter() {
            let root_key = root.to_string_lossy().to_string();
            if self.shadow.delete_files(&root_key, keys).await.is_ok() {
                flushed_deleted.push(root.clone());
            } else {
                error!("shadow index delete_files failed for {}, retrying next tick", root.display());
            }
        }
        for root in flushed_deleted {
            pending.deleted.remove(&root);
        }
    }

    /// `true` once reconciliation for `path` has completed and the watch is
    /// live; `false` while the add request is still queued or reconciling.
    pub async fn is_monitoring(&self, path: &Path) -> bool {
        self.roots
            .read()
            .await
            .get(path)
            .map(|r| r.monitoring)
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub async fn monitored_root_count(&self) -> usize {
        self.roots.read().await.len()
    }

    /// Registers a root directly (bypassing watch installation), so unit
    /// tests can drive `handle_kernel_event` without an OS-backed watcher.
    #[cfg(test)]
    async fn insert_test_root(&self, path: PathBuf, event_mask: EventMask) {
        self.roots.write().await.insert(
            path.clone(),
            MonitoredRoot {
                path,
                event_mask,
                monitoring: true,
                _watcher: None,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use notify::event::{ModifyKind, RenameMode};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct NoopStore {
        add_calls: AtomicUsize,
        update_calls: AtomicUsize,
        delete_calls: AtomicUsize,
    }

    #[async_trait]
    impl ShadowIndexStore for NoopStore {
        async fn add_files(&self, _rows: &[crate::types::ShadowRow]) -> Result<()> {
            self.add_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn update_files(&self, _rows: &[crate::types::ShadowRow]) -> Result<()> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn delete_files(&self, _root: &str, _keys: &[ShadowKey]) -> Result<()> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn list_subtree(&self, _root: &str) -> Result<Vec<crate::types::ShadowRow>> {
            Ok(Vec::new())
        }
    }

    fn recording_callback() -> (
        ConsumerCallback,
        Arc<StdMutex<Vec<(PathBuf, CanonicalEventKind, SourceTag)>>>,
    ) {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let recorded = Arc::clone(&events);
        let callback: ConsumerCallback = Arc::new(move |_root, path, kind, source| {
            recorded.lock().unwrap().push((path.to_path_buf(), kind, source));
        });
        (callback, events)
    }

    #[tokio::test]
    async fn root_rename_dispatches_monitored_dir_moved_without_index_mutation() {
        let store = Arc::new(NoopStore::default());
        let (callback, events) = recording_callback();
        let root = PathBuf::from("/watched/root");

        let core = FsMonitorCore::new(
            Arc::clone(&store) as Arc<dyn ShadowIndexStore>,
            WatchConfig::default(),
            ReconciliationMode::Persistent,
            vec![],
            callback,
        );
        core.insert_test_root(root.clone(), EventMask::ALL).await;

        let event = Event::new(notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(root.clone());
        core.handle_kernel_event(event).await;

        let recorded = events.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0], (root, CanonicalEventKind::MonitoredDirMoved, SOURCE_LIVE));
        drop(recorded);

        assert_eq!(store.add_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.update_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn descendant_rename_is_not_mistaken_for_a_root_move() {
        let store = Arc::new(NoopStore::default());
        let (callback, events) = recording_callback();
        let root = PathBuf::from("/watched/root");
        let child = root.join("child.txt");

        let core = FsMonitorCore::new(
            Arc::clone(&store) as Arc<dyn ShadowIndexStore>,
            WatchConfig::default(),
            ReconciliationMode::Persistent,
            vec![],
            callback,
        );
        core.insert_test_root(root.clone(), EventMask::ALL).await;

        // A descendant's "from" half of a rename is an ordinary deletion,
        // not a root move, even though both arrive as `Modify(Name(_))`.
        let event = Event::new(notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(child.clone());
        core.handle_kernel_event(event).await;

        let recorded = events.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1, CanonicalEventKind::Deleted);
    }
}
