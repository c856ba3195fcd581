//! Logistics network index and its background rebuild loop.

mod index;

pub use index::{NetworkIndexEntry, NetworkSnapshot, SourceLocation};

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    error::LogisticsError,
    models::ItemId,
    world::NetworkScanner,
};

/// Shared handle to the network index.
///
/// Cloning is cheap; every clone observes the same snapshot. Queries read
/// the last completed snapshot and never wait for a rebuild in progress.
#[derive(Clone, Default)]
pub struct LogisticsNetwork {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    snapshot: RwLock<Arc<NetworkSnapshot>>,
    reservations: Mutex<HashMap<ItemId, u32>>,
    generation: AtomicU64,
    initted: AtomicBool,
    first_load_complete: AtomicBool,
    stopped: AtomicBool,
    rebuild_guard: Mutex<()>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LogisticsNetwork {
    /// Create an empty, unstarted network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the background rebuild loop on the current tokio runtime.
    ///
    /// Calling `start` again, or after [`stop`](Self::stop), is a no-op.
    pub fn start(
        &self,
        scanner: Arc<dyn NetworkScanner>,
        interval: Duration,
    ) -> Result<(), LogisticsError> {
        if self.inner.stopped.load(Ordering::Acquire) {
            warn!("ignoring start of a stopped logistics network");
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|err| LogisticsError::Runtime(err.to_string()))?;
        if self.inner.initted.swap(true, Ordering::AcqRel) {
            debug!("logistics network already started");
            return Ok(());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let weak = Arc::downgrade(&self.inner);
        let handle = runtime.spawn(rebuild_loop(weak, scanner, interval, stop_rx));
        *self.inner.worker.lock() = Some(Worker {
            stop: stop_tx,
            handle,
        });
        info!("logistics network started");
        Ok(())
    }

    /// Halt the background rebuild loop. Safe to call repeatedly or before `start`.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        if let Some(worker) = self.inner.worker.lock().take() {
            let _ = worker.stop.send(true);
            worker.handle.abort();
            info!("logistics network stopped");
        }
    }

    /// Whether `start` has been called.
    pub fn is_initted(&self) -> bool {
        self.inner.initted.load(Ordering::Acquire)
    }

    /// Whether at least one full scan has been published.
    pub fn is_first_load_complete(&self) -> bool {
        self.inner.first_load_complete.load(Ordering::Acquire)
    }

    /// Both readiness flags set.
    pub fn is_ready(&self) -> bool {
        self.is_initted() && self.is_first_load_complete()
    }

    /// Scan the world and publish a new snapshot.
    ///
    /// Readers keep seeing the previous snapshot until the new one is
    /// complete. A failed scan keeps the previous snapshot.
    pub fn rebuild(&self, scanner: &dyn NetworkScanner) -> bool {
        let _guard = self.inner.rebuild_guard.lock();
        let stock = match scanner.scan() {
            Ok(stock) => stock,
            Err(err) => {
                warn!("network scan failed, keeping previous index: {err}");
                return false;
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(NetworkSnapshot::build(generation, stock));
        debug!(
            generation,
            items = snapshot.item_count(),
            stations = snapshot.stations().len(),
            "network index rebuilt"
        );
        *self.inner.snapshot.write() = snapshot;

        if !self.inner.first_load_complete.swap(true, Ordering::AcqRel) {
            info!("logistics network first load complete");
        }
        true
    }

    /// Latest completed snapshot.
    pub fn snapshot(&self) -> Arc<NetworkSnapshot> {
        self.inner.snapshot.read().clone()
    }

    /// Whether the latest snapshot has stock of `item`.
    pub fn has_item(&self, item: ItemId) -> bool {
        self.snapshot()
            .entry(item)
            .map(|entry| entry.available_quantity > 0)
            .unwrap_or(false)
    }

    /// Index entry for `item` from the latest snapshot.
    pub fn entry(&self, item: ItemId) -> Option<NetworkIndexEntry> {
        self.snapshot().entry(item).cloned()
    }

    /// Snapshot quantity minus outstanding reservations.
    pub fn available(&self, item: ItemId) -> u32 {
        let indexed = self
            .snapshot()
            .entry(item)
            .map(|entry| entry.available_quantity)
            .unwrap_or(0);
        indexed.saturating_sub(self.reserved(item))
    }

    /// Quantity currently reserved for pending deliveries.
    pub fn reserved(&self, item: ItemId) -> u32 {
        self.inner
            .reservations
            .lock()
            .get(&item)
            .copied()
            .unwrap_or(0)
    }

    /// Reserve up to `quantity` of the available stock, returning the amount reserved.
    pub fn reserve(&self, item: ItemId, quantity: u32) -> u32 {
        let granted = quantity.min(self.available(item));
        if granted > 0 {
            *self.inner.reservations.lock().entry(item).or_insert(0) += granted;
        }
        granted
    }

    /// Return a reservation once the stock was physically taken or abandoned.
    pub fn release(&self, item: ItemId, quantity: u32) {
        let mut reservations = self.inner.reservations.lock();
        if let Some(reserved) = reservations.get_mut(&item) {
            *reserved = reserved.saturating_sub(quantity);
            if *reserved == 0 {
                reservations.remove(&item);
            }
        }
    }
}

impl std::fmt::Debug for LogisticsNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogisticsNetwork")
            .field("initted", &self.is_initted())
            .field("first_load_complete", &self.is_first_load_complete())
            .field("generation", &self.snapshot().generation())
            .finish()
    }
}

async fn rebuild_loop(
    inner: Weak<Inner>,
    scanner: Arc<dyn NetworkScanner>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let Some(strong) = inner.upgrade() else {
            break;
        };
        let network = LogisticsNetwork { inner: strong };
        let scan_with = scanner.clone();
        if let Err(err) =
            tokio::task::spawn_blocking(move || network.rebuild(scan_with.as_ref())).await
        {
            error!("network rebuild task failed: {err}");
            break;
        }

        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("network rebuild loop exited");
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::{
        error::WorldError,
        models::StationId,
        world::StationStock,
    };

    struct FixedScanner(Vec<StationStock>);

    impl NetworkScanner for FixedScanner {
        fn scan(&self) -> Result<Vec<StationStock>, WorldError> {
            Ok(self.0.clone())
        }
    }

    struct FailingScanner;

    impl NetworkScanner for FailingScanner {
        fn scan(&self) -> Result<Vec<StationStock>, WorldError> {
            Err(WorldError::Unavailable("factory not loaded".to_string()))
        }
    }

    struct GatedScanner {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        stock: Vec<StationStock>,
    }

    impl NetworkScanner for GatedScanner {
        fn scan(&self) -> Result<Vec<StationStock>, WorldError> {
            let _ = self.entered.lock().send(());
            let _ = self.release.lock().recv();
            Ok(self.stock.clone())
        }
    }

    fn stock(item: u32, quantity: u32) -> Vec<StationStock> {
        vec![StationStock {
            station_id: StationId(1),
            items: vec![(ItemId(item), quantity)],
        }]
    }

    #[test]
    fn has_item_reads_previous_snapshot_during_rebuild() {
        let network = LogisticsNetwork::new();
        assert!(network.rebuild(&FixedScanner(stock(42, 10))));
        assert!(network.has_item(ItemId(42)));

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let scanner = GatedScanner {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            stock: stock(7, 3),
        };

        let rebuilding = network.clone();
        let worker = std::thread::spawn(move || rebuilding.rebuild(&scanner));

        entered_rx.recv().expect("scan started");
        assert!(network.has_item(ItemId(42)));
        assert!(!network.has_item(ItemId(7)));

        release_tx.send(()).expect("release scan");
        assert!(worker.join().expect("rebuild thread"));
        assert!(!network.has_item(ItemId(42)));
        assert!(network.has_item(ItemId(7)));
    }

    #[test]
    fn failed_scan_keeps_snapshot() {
        let network = LogisticsNetwork::new();
        network.rebuild(&FixedScanner(stock(42, 10)));
        assert!(!network.rebuild(&FailingScanner));
        assert_eq!(network.available(ItemId(42)), 10);
        assert_eq!(network.snapshot().generation(), 1);
    }

    #[test]
    fn first_load_requires_successful_scan() {
        let network = LogisticsNetwork::new();
        assert!(!network.is_first_load_complete());
        network.rebuild(&FailingScanner);
        assert!(!network.is_first_load_complete());
        network.rebuild(&FixedScanner(Vec::new()));
        assert!(network.is_first_load_complete());
    }

    #[test]
    fn reservations_reduce_availability() {
        let network = LogisticsNetwork::new();
        network.rebuild(&FixedScanner(stock(42, 60)));

        assert_eq!(network.reserve(ItemId(42), 40), 40);
        assert_eq!(network.available(ItemId(42)), 20);
        assert_eq!(network.reserve(ItemId(42), 40), 20);
        assert_eq!(network.available(ItemId(42)), 0);
        assert!(network.has_item(ItemId(42)));

        network.release(ItemId(42), 100);
        assert_eq!(network.reserved(ItemId(42)), 0);
        assert_eq!(network.available(ItemId(42)), 60);
    }

    #[test]
    fn start_outside_runtime_is_rejected() {
        let network = LogisticsNetwork::new();
        let result = network.start(Arc::new(FixedScanner(Vec::new())), Duration::from_millis(50));
        assert!(matches!(result, Err(LogisticsError::Runtime(_))));
        assert!(!network.is_initted());
        network.stop();
        network.stop();
    }

    #[tokio::test]
    async fn background_loop_completes_first_load_and_stops() {
        let network = LogisticsNetwork::new();
        let scanner = Arc::new(FixedScanner(stock(42, 5)));
        network
            .start(scanner.clone(), Duration::from_millis(20))
            .expect("start network");
        network
            .start(scanner, Duration::from_millis(20))
            .expect("second start is a no-op");
        assert!(network.is_initted());

        for _ in 0..200 {
            if network.is_first_load_complete() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(network.is_first_load_complete());
        assert!(network.has_item(ItemId(42)));

        network.stop();
        network.stop();
        assert!(network.is_initted());
    }
}
