//! Day-sliced access to the daily actions fact table.

use std::time::Duration;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use crate::application::prewarm::DailySlice;
use crate::application::repos::{BackingStore, Filter, RepoError};
use crate::application::repository::CachingRepository;
use crate::domain::DailyAction;

pub const DAY_SLICE_LABEL: &str = "Day";

/// Caches one slice per calendar day. Today's slice still receives writes,
/// so it lives for `today_ttl`; closed days use the cache default.
pub struct DailyActionsRepository<S> {
    inner: CachingRepository<DailyAction, S>,
    today_ttl: Duration,
}

impl<S> DailyActionsRepository<S>
where
    S: BackingStore<DailyAction>,
{
    pub fn new(inner: CachingRepository<DailyAction, S>, today_ttl: Duration) -> Self {
        Self { inner, today_ttl }
    }

    pub fn repository(&self) -> &CachingRepository<DailyAction, S> {
        &self.inner
    }

    pub async fn get_for_day(&self, day: Date) -> Result<Vec<DailyAction>, RepoError> {
        let ttl = if day >= OffsetDateTime::now_utc().date() {
            self.today_ttl
        } else {
            self.inner.cache().config().default_ttl()
        };
        self.inner
            .get_cached_slice(DAY_SLICE_LABEL, &day_filter(day), ttl)
            .await
    }
}

fn day_filter(day: Date) -> Filter {
    Filter::new().eq("date", day)
}

#[async_trait]
impl<S> DailySlice for DailyActionsRepository<S>
where
    S: BackingStore<DailyAction> + 'static,
{
    async fn warm_day(&self, day: Date) -> Result<usize, RepoError> {
        Ok(self.get_for_day(day).await?.len())
    }

    async fn refresh_day(&self, day: Date) -> Result<usize, RepoError> {
        self.inner
            .invalidate_slice(DAY_SLICE_LABEL, &day_filter(day))
            .await;
        self.warm_day(day).await
    }

    async fn forget_day(&self, day: Date) -> bool {
        self.inner
            .invalidate_slice(DAY_SLICE_LABEL, &day_filter(day))
            .await
    }
}
