//! Metadata cache prewarming.
//!
//! Loads the hot lookup tables and today's slice of the daily fact table into
//! the cache before traffic arrives, then keeps today's slice fresh on a fixed
//! cadence. Failures are logged and retried on the next tick; they never stop
//! the loop.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use metrics::histogram;
use time::{Date, OffsetDateTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::application::repos::{BackingStore, Entity, RepoError};
use crate::application::repository::CachingRepository;
use crate::cache::lock::mutex_lock;

const SOURCE: &str = "application::prewarm";
const TARGET: &str = "ppreporter::prewarm";

pub const METRIC_CACHE_PREWARM_MS: &str = "ppreporter_cache_prewarm_ms";

const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(10);

/// A lookup table whose full active listing is worth loading up front.
#[async_trait]
pub trait Prewarm: Send + Sync {
    fn entity_type(&self) -> &'static str;

    /// Loads the listing through the cache; returns the row count.
    async fn prewarm(&self) -> Result<usize, RepoError>;
}

#[async_trait]
impl<T, S> Prewarm for CachingRepository<T, S>
where
    T: Entity,
    S: BackingStore<T> + 'static,
{
    fn entity_type(&self) -> &'static str {
        T::TYPE_NAME
    }

    async fn prewarm(&self) -> Result<usize, RepoError> {
        Ok(self.get_all(false).await?.len())
    }
}

/// A fact table cached one day at a time.
#[async_trait]
pub trait DailySlice: Send + Sync {
    /// Reads the day through the cache.
    async fn warm_day(&self, day: Date) -> Result<usize, RepoError>;

    /// Drops the cached day and loads it again from the store.
    async fn refresh_day(&self, day: Date) -> Result<usize, RepoError>;

    /// Drops the cached day; returns true when it was cached.
    async fn forget_day(&self, day: Date) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrewarmSchedule {
    pub startup_delay: Duration,
    pub refresh_interval: Duration,
}

impl Default for PrewarmSchedule {
    fn default() -> Self {
        Self {
            startup_delay: DEFAULT_STARTUP_DELAY,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl PrewarmSchedule {
    /// Refresh cadence, never shorter than ten milliseconds.
    pub fn refresh_period(&self) -> Duration {
        self.refresh_interval.max(MIN_REFRESH_INTERVAL)
    }
}

impl From<&crate::config::PrewarmSettings> for PrewarmSchedule {
    fn from(settings: &crate::config::PrewarmSettings) -> Self {
        Self {
            startup_delay: settings.startup_delay,
            refresh_interval: settings.refresh_interval,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrewarmOutcome {
    Completed { warmed: usize, failed: usize },
    AlreadyWarm,
}

pub struct MetadataPrewarmer {
    lookups: Vec<Arc<dyn Prewarm>>,
    daily: Option<Arc<dyn DailySlice>>,
    schedule: PrewarmSchedule,
    gate: tokio::sync::Mutex<()>,
    prewarmed: AtomicBool,
    current_day: Mutex<Option<Date>>,
}

impl MetadataPrewarmer {
    pub fn new(schedule: PrewarmSchedule) -> Self {
        Self {
            lookups: Vec::new(),
            daily: None,
            schedule,
            gate: tokio::sync::Mutex::new(()),
            prewarmed: AtomicBool::new(false),
            current_day: Mutex::new(None),
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn Prewarm>) -> Self {
        self.lookups.push(lookup);
        self
    }

    pub fn with_daily_slice(mut self, daily: Arc<dyn DailySlice>) -> Self {
        self.daily = Some(daily);
        self
    }

    pub fn is_prewarmed(&self) -> bool {
        self.prewarmed.load(Ordering::Acquire)
    }

    pub async fn prewarm_cache(&self) -> PrewarmOutcome {
        self.prewarm_at(today()).await
    }

    /// Full prewarm. Runs at most once at a time and becomes a no-op after
    /// the first run without failures.
    #[instrument(skip(self))]
    pub async fn prewarm_at(&self, today: Date) -> PrewarmOutcome {
        let _gate = self.gate.lock().await;
        if self.is_prewarmed() {
            debug!(target = TARGET, "metadata cache already warm");
            return PrewarmOutcome::AlreadyWarm;
        }

        let started = Instant::now();
        info!(
            target = TARGET,
            lookups = self.lookups.len(),
            daily = self.daily.is_some(),
            "warming metadata cache"
        );

        let results = join_all(
            self.lookups
                .iter()
                .map(|lookup| async move { (lookup.entity_type(), lookup.prewarm().await) }),
        )
        .await;

        let mut warmed = 0;
        let mut failed = 0;
        for (entity_type, result) in results {
            match result {
                Ok(rows) => {
                    warmed += 1;
                    debug!(target = TARGET, entity_type, rows, "lookup warmed");
                }
                Err(err) => {
                    failed += 1;
                    warn!(target = TARGET, entity_type, error = %err, "lookup prewarm failed");
                }
            }
        }

        if let Some(daily) = &self.daily {
            match daily.warm_day(today).await {
                Ok(rows) => {
                    warmed += 1;
                    *mutex_lock(&self.current_day, SOURCE, "prewarm_at") = Some(today);
                    debug!(target = TARGET, day = %today, rows, "daily slice warmed");
                }
                Err(err) => {
                    failed += 1;
                    warn!(target = TARGET, day = %today, error = %err, "daily slice prewarm failed");
                }
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_CACHE_PREWARM_MS).record(elapsed_ms);
        if failed == 0 {
            self.prewarmed.store(true, Ordering::Release);
        }
        info!(
            target = TARGET,
            warmed, failed, elapsed_ms, "metadata cache warm finished"
        );
        PrewarmOutcome::Completed { warmed, failed }
    }

    pub async fn refresh_today(&self) -> Option<usize> {
        self.refresh_at(today()).await
    }

    /// Reloads `today`'s slice. When the day changed since the last load the
    /// previous day's slice is dropped first.
    #[instrument(skip(self))]
    pub async fn refresh_at(&self, today: Date) -> Option<usize> {
        let daily = self.daily.as_ref()?;
        let _gate = self.gate.lock().await;

        let previous = mutex_lock(&self.current_day, SOURCE, "refresh_at").replace(today);
        if let Some(previous) = previous
            && previous != today
        {
            let dropped = daily.forget_day(previous).await;
            info!(
                target = TARGET,
                previous = %previous,
                today = %today,
                dropped,
                "day rolled over"
            );
        }

        match daily.refresh_day(today).await {
            Ok(rows) => {
                debug!(target = TARGET, day = %today, rows, "daily slice refreshed");
                Some(rows)
            }
            Err(err) => {
                warn!(target = TARGET, day = %today, error = %err, "daily slice refresh failed");
                None
            }
        }
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Waits out the startup delay, prewarms, then refreshes on the schedule
    /// until `cancel` fires. A failed prewarm is retried instead of refreshed.
    pub async fn run(&self, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.schedule.startup_delay) => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = self.prewarm_cache() => {}
        }

        let mut ticker = tokio::time::interval(self.schedule.refresh_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.is_prewarmed() {
                        self.refresh_today().await;
                    } else {
                        self.prewarm_cache().await;
                    }
                }
            }
        }
        info!(target = TARGET, "prewarm loop stopped");
    }
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_period_is_clamped() {
        let schedule = PrewarmSchedule {
            startup_delay: Duration::ZERO,
            refresh_interval: Duration::ZERO,
        };
        assert_eq!(schedule.refresh_period(), MIN_REFRESH_INTERVAL);
        assert_eq!(
            PrewarmSchedule::default().refresh_period(),
            DEFAULT_REFRESH_INTERVAL
        );
    }
}
