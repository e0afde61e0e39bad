//! Comic lookups measured on both the suspending and the cold path.

use super::client::XkcdClient;
use super::model::Xkcd;
use crate::timer::{
    Deferred, DirectCallMetrics, LatencyBuckets, ReactiveCallMetrics, Tags, TimerRegistry,
};
use crate::{HeimdallError, Result};

/// Timer of [`XkcdService::comic_by_id`].
pub const COMIC_BY_ID_TIMER: &str = "service.getComicById";

/// Timer triple of [`XkcdService::comic_by_id_deferred`].
pub const COMIC_BY_ID_DEFERRED_TIMER: &str = "service.getComicByIdAsMono";

#[derive(Debug, Clone)]
pub struct XkcdService {
    client: XkcdClient,
    direct: DirectCallMetrics,
    reactive: ReactiveCallMetrics,
}

impl XkcdService {
    pub fn new(client: XkcdClient, registry: &TimerRegistry, buckets: &LatencyBuckets) -> Result<Self> {
        let tags = Tags::new();
        Ok(Self {
            direct: DirectCallMetrics::new(registry, COMIC_BY_ID_TIMER, &tags, buckets)?,
            reactive: ReactiveCallMetrics::new(registry, COMIC_BY_ID_DEFERRED_TIMER, &tags, buckets)?,
            client,
        })
    }

    pub async fn comic_by_id(&self, id: &str) -> Result<Option<Xkcd>> {
        self.direct
            .measure(|| async {
                let comic = self.client.comic_by_id(id).await?;
                Ok::<_, HeimdallError>(comic.map(Xkcd::from))
            })
            .await
    }

    pub fn comic_by_id_deferred(&self, id: &str) -> Result<Deferred<Option<Xkcd>>> {
        Ok(self
            .client
            .comic_by_id_deferred(id)?
            .map(|comic| comic.map(Xkcd::from))
            .with_statistical_metrics(&self.reactive))
    }
}
