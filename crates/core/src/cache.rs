//! Time-bounded element cache.
//!
//! One snapshot per device. Snapshots are immutable and shared as `Arc`s;
//! refreshing swaps the whole `Arc` under the lock, so readers never see a
//! partially written list. Detection itself runs outside the lock, which
//! means two callers that both see a stale entry may both detect; the last
//! one to finish wins.

use crate::element::Element;
use crate::error::Result;
use crate::mode::{DetectionMode, Detector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a snapshot may be reused.
pub const CACHE_TTL: Duration = Duration::from_secs(30);

/// Source of "now" for staleness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// One complete detection result.
#[derive(Debug, Clone)]
pub struct DetectionSnapshot {
    pub elements: Vec<Element>,
    pub captured_at: Instant,
    /// Mode the snapshot was requested with; together with `clickable_only`
    /// it decides whether a later request may reuse it.
    pub mode: DetectionMode,
    /// Pass that actually produced `elements`. Differs from `mode` only for
    /// `Auto`, which resolves to `Tree` or `Optical`.
    pub source: DetectionMode,
    pub clickable_only: bool,
}

impl DetectionSnapshot {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.captured_at)
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        self.age(now) > CACHE_TTL
    }

    fn serves(&self, mode: DetectionMode, clickable_only: bool) -> bool {
        self.mode == mode && self.clickable_only == clickable_only
    }
}

/// Holds the latest [`DetectionSnapshot`] per device.
pub struct ElementCache {
    detector: Arc<dyn Detector>,
    clock: Arc<dyn Clock>,
    snapshots: Mutex<HashMap<String, Arc<DetectionSnapshot>>>,
}

impl ElementCache {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self::with_clock(detector, Arc::new(SystemClock))
    }

    pub fn with_clock(detector: Arc<dyn Detector>, clock: Arc<dyn Clock>) -> Self {
        Self {
            detector,
            clock,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a fresh snapshot for `device`, detecting only when needed.
    ///
    /// The stored snapshot is reused when it is younger than [`CACHE_TTL`],
    /// was produced with the same mode and filter, and `force_refresh` is
    /// off. A failed detection leaves the stored snapshot as it was.
    pub fn get(
        &self,
        device: Option<&str>,
        mode: DetectionMode,
        clickable_only: bool,
        force_refresh: bool,
    ) -> Result<Arc<DetectionSnapshot>> {
        let key = device_key(device);

        if !force_refresh {
            let now = self.clock.now();
            let cached = self.lock().get(key).cloned();
            if let Some(snapshot) =
                cached.filter(|s| !s.is_stale(now) && s.serves(mode, clickable_only))
            {
                debug!(device = key, age = ?snapshot.age(now), "reusing cached elements");
                return Ok(snapshot);
            }
        }

        let detection = self.detector.detect(device, mode, clickable_only)?;
        let snapshot = Arc::new(DetectionSnapshot {
            elements: detection.elements,
            captured_at: self.clock.now(),
            mode,
            source: detection.source,
            clickable_only,
        });
        debug!(device = key, %mode, source = %snapshot.source, count = snapshot.elements.len(), "stored new snapshot");
        self.lock().insert(key.to_string(), snapshot.clone());
        Ok(snapshot)
    }

    /// The stored snapshot for `device`, if it is still fresh.
    pub fn peek(&self, device: Option<&str>) -> Option<Arc<DetectionSnapshot>> {
        let now = self.clock.now();
        self.lock()
            .get(device_key(device))
            .filter(|s| !s.is_stale(now))
            .cloned()
    }

    /// Drops the snapshot for `device`; the next `get` re-detects.
    pub fn invalidate(&self, device: Option<&str>) {
        if self.lock().remove(device_key(device)).is_some() {
            debug!(device = device_key(device), "element cache invalidated");
        }
    }

    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<DetectionSnapshot>>> {
        // Entries are whole `Arc` swaps, so a poisoned map is still consistent.
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn device_key(device: Option<&str>) -> &str {
    device.unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::tests::element;
    use crate::error::AppError;
    use crate::mode::Detection;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Clock that only moves when told to.
    struct ManualClock {
        start: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        fn set_secs(&self, secs: u64) {
            *self.offset.lock().unwrap() = Duration::from_secs(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + *self.offset.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct CountingDetector {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl Detector for CountingDetector {
        fn detect(&self, _device: Option<&str>, mode: DetectionMode, _clickable_only: bool) -> Result<Detection> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::capture("device offline"));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let elements = vec![element(0, &format!("detection {n}"))];
            Ok(match mode {
                DetectionMode::Optical => Detection::optical(elements),
                _ => Detection::tree(elements),
            })
        }
    }

    fn setup() -> (Arc<CountingDetector>, Arc<ManualClock>, ElementCache) {
        let detector = Arc::new(CountingDetector::default());
        let clock = Arc::new(ManualClock::new());
        let cache = ElementCache::with_clock(detector.clone(), clock.clone());
        (detector, clock, cache)
    }

    #[test]
    fn reuses_within_ttl_and_refreshes_after() {
        let (detector, clock, cache) = setup();

        let first = cache.get(None, DetectionMode::Tree, false, false).unwrap();
        clock.set_secs(29);
        let second = cache.get(None, DetectionMode::Tree, false, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);

        clock.set_secs(31);
        let third = cache.get(None, DetectionMode::Tree, false, false).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn exactly_ttl_is_still_fresh() {
        let (detector, clock, cache) = setup();
        cache.get(None, DetectionMode::Tree, false, false).unwrap();
        clock.set_secs(30);
        cache.get(None, DetectionMode::Tree, false, false).unwrap();
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn force_refresh_and_invalidate_redetect() {
        let (detector, _clock, cache) = setup();
        cache.get(None, DetectionMode::Tree, false, false).unwrap();
        cache.get(None, DetectionMode::Tree, false, true).unwrap();
        assert_eq!(detector.calls.load(Ordering::SeqCst), 2);

        cache.invalidate(None);
        assert!(cache.peek(None).is_none());
        cache.get(None, DetectionMode::Tree, false, false).unwrap();
        assert_eq!(detector.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn mode_or_filter_change_redetects() {
        let (detector, _clock, cache) = setup();
        cache.get(None, DetectionMode::Tree, false, false).unwrap();
        cache.get(None, DetectionMode::Optical, false, false).unwrap();
        cache.get(None, DetectionMode::Optical, true, false).unwrap();
        assert_eq!(detector.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn devices_are_cached_separately() {
        let (detector, _clock, cache) = setup();
        cache.get(Some("a"), DetectionMode::Tree, false, false).unwrap();
        cache.get(Some("b"), DetectionMode::Tree, false, false).unwrap();
        cache.get(Some("a"), DetectionMode::Tree, false, false).unwrap();
        assert_eq!(detector.calls.load(Ordering::SeqCst), 2);

        cache.invalidate(Some("a"));
        assert!(cache.peek(Some("a")).is_none());
        assert!(cache.peek(Some("b")).is_some());
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot() {
        let (detector, clock, cache) = setup();
        let first = cache.get(None, DetectionMode::Tree, false, false).unwrap();

        detector.fail.store(true, Ordering::SeqCst);
        assert!(cache.get(None, DetectionMode::Tree, false, true).is_err());

        let kept = cache.peek(None).expect("previous snapshot kept");
        assert!(Arc::ptr_eq(&first, &kept));

        clock.set_secs(31);
        assert!(cache.peek(None).is_none(), "kept snapshot still ages out");
    }

    #[test]
    fn snapshot_records_requested_mode_and_producing_pass() {
        let (_detector, _clock, cache) = setup();
        let auto = cache.get(None, DetectionMode::Auto, false, false).unwrap();
        assert_eq!(auto.mode, DetectionMode::Auto);
        assert_eq!(auto.source, DetectionMode::Tree);

        let optical = cache.get(Some("b"), DetectionMode::Optical, false, false).unwrap();
        assert_eq!(optical.source, DetectionMode::Optical);
    }
}
