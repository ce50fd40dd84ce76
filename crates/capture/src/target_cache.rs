//! Background capture-target discovery
//!
//! Target lookup can be slow (remote X servers, large window lists), so in
//! background mode it runs on a worker thread and publishes into a cache.
//! The worker only ever publishes a found target; clearing is left to
//! [`TargetCache::invalidate`], so one empty refresh does not drop a usable
//! target.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::{CaptureRegion, WindowHandle};

/// Window chosen as capture source, with the bounds seen at discovery time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub window: WindowHandle,
    pub bounds: CaptureRegion,
}

pub struct TargetCache {
    slot: Arc<RwLock<Option<Target>>>,
    refreshing: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    grabs_since_refresh: u32,
    refresh_interval: u32,
    timeout: Duration,
}

impl TargetCache {
    pub fn new(refresh_interval: u32, timeout: Duration) -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
            refreshing: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            grabs_since_refresh: 0,
            refresh_interval: refresh_interval.max(1),
            timeout,
        }
    }

    /// Count one grab, start a refresh when due and return the cached target
    ///
    /// A refresh is due on first use, whenever the cache is empty, and every
    /// `refresh_interval` grabs. Never blocks on the worker.
    pub fn lookup<F>(&mut self, region: CaptureRegion, resolve: F) -> Option<Target>
    where
        F: FnOnce(CaptureRegion) -> Option<Target> + Send + 'static,
    {
        self.grabs_since_refresh += 1;
        let cached = *self.slot.read();

        if cached.is_none() || self.grabs_since_refresh >= self.refresh_interval {
            self.grabs_since_refresh = 0;
            self.spawn_refresh(region, resolve);
        }

        cached
    }

    /// Drop the cached target; the next lookup schedules a re-resolve
    pub fn invalidate(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.slot.write() = None;
        self.grabs_since_refresh = 0;
    }

    pub fn current(&self) -> Option<Target> {
        *self.slot.read()
    }

    /// True while a discovery worker is running
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    fn spawn_refresh<F>(&self, region: CaptureRegion, resolve: F)
    where
        F: FnOnce(CaptureRegion) -> Option<Target> + Send + 'static,
    {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            trace!("Target discovery already running");
            return;
        }

        let slot = Arc::clone(&self.slot);
        let refreshing = Arc::clone(&self.refreshing);
        let generation = Arc::clone(&self.generation);
        let started_generation = generation.load(Ordering::SeqCst);
        let timeout = self.timeout;

        let spawned = std::thread::Builder::new()
            .name("target-discovery".into())
            .spawn(move || {
                let started = Instant::now();
                let found = resolve(region);
                let elapsed = started.elapsed();

                if elapsed > timeout {
                    debug!(?elapsed, "Discarding late target discovery result");
                } else if generation.load(Ordering::SeqCst) != started_generation {
                    debug!("Discarding target discovered before invalidation");
                } else if let Some(target) = found {
                    trace!(?target, ?elapsed, "Publishing capture target");
                    *slot.write() = Some(target);
                } else {
                    trace!(?elapsed, "Target discovery found nothing, keeping cache");
                }

                refreshing.store(false, Ordering::SeqCst);
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn target discovery worker: {}", e);
            self.refreshing.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn wait_idle(cache: &TargetCache) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while cache.is_refreshing() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!cache.is_refreshing(), "discovery worker did not finish");
    }

    fn target(id: u64) -> Target {
        Target {
            window: WindowHandle(id),
            bounds: CaptureRegion::new(0, 0, 640, 480),
        }
    }

    #[test]
    fn test_first_lookup_schedules_discovery() {
        let mut cache = TargetCache::new(300, Duration::from_secs(2));
        let region = CaptureRegion::new(0, 0, 100, 100);

        assert_eq!(cache.lookup(region, |_| Some(target(7))), None);
        wait_idle(&cache);
        assert_eq!(cache.current(), Some(target(7)));
    }

    #[test]
    fn test_refresh_every_interval() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut cache = TargetCache::new(3, Duration::from_secs(2));
        let region = CaptureRegion::new(0, 0, 100, 100);

        for _ in 0..7 {
            let calls = Arc::clone(&calls);
            cache.lookup(region, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(target(1))
            });
            wait_idle(&cache);
        }

        // first use, then grabs 4 and 7
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalidate_clears_and_rediscovers() {
        let mut cache = TargetCache::new(300, Duration::from_secs(2));
        let region = CaptureRegion::new(0, 0, 100, 100);

        cache.lookup(region, |_| Some(target(1)));
        wait_idle(&cache);
        assert!(cache.current().is_some());

        cache.invalidate();
        assert_eq!(cache.current(), None);

        assert_eq!(cache.lookup(region, |_| Some(target(2))), None);
        wait_idle(&cache);
        assert_eq!(cache.current(), Some(target(2)));
    }

    #[test]
    fn test_empty_refresh_keeps_cached_target() {
        let mut cache = TargetCache::new(1, Duration::from_secs(2));
        let region = CaptureRegion::new(0, 0, 100, 100);

        cache.lookup(region, |_| Some(target(4)));
        wait_idle(&cache);
        assert_eq!(cache.current(), Some(target(4)));

        // every grab refreshes; this refresh comes back empty
        assert_eq!(cache.lookup(region, |_| None), Some(target(4)));
        wait_idle(&cache);
        assert_eq!(cache.current(), Some(target(4)));
    }

    #[test]
    fn test_late_result_is_discarded() {
        let mut cache = TargetCache::new(300, Duration::from_millis(5));
        let region = CaptureRegion::new(0, 0, 100, 100);

        cache.lookup(region, |_| {
            std::thread::sleep(Duration::from_millis(50));
            Some(target(3))
        });
        wait_idle(&cache);
        assert_eq!(cache.current(), None);
    }
}
