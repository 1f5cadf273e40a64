use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    cadence::{PeriodCadence, duration_until},
    publish::PagePublisher,
};
use crate::{nav::cache::WindowCache, observability::metrics::Metrics};

/// 1回の自動投稿の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub run_id: Uuid,
    pub delivered: Vec<u64>,
    pub failed: Vec<u64>,
}

/// 期間境界ごとに「今日」のページを配信先へ投稿するデーモン。
pub struct AutoPostDaemon {
    cache: Arc<WindowCache>,
    publisher: Arc<dyn PagePublisher>,
    destinations: Vec<u64>,
    cadence: PeriodCadence,
    metrics: Arc<Metrics>,
}

impl AutoPostDaemon {
    #[must_use]
    pub fn new(
        cache: Arc<WindowCache>,
        publisher: Arc<dyn PagePublisher>,
        destinations: Vec<u64>,
        delay: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        let cadence = PeriodCadence::new(cache.settings().period, delay);
        Self {
            cache,
            publisher,
            destinations,
            cadence,
            metrics,
        }
    }

    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        loop {
            let now = Utc::now();
            let next = self.cadence.next_run_from(now);
            let wait = duration_until(next, now);
            info!(
                next_run_utc = %next.to_rfc3339(),
                wait_seconds = wait.as_secs(),
                destinations = self.destinations.len(),
                "scheduled automatic post"
            );
            sleep(wait).await;

            let report = self.publish_today(Utc::now()).await;
            if report.failed.is_empty() {
                info!(
                    run_id = %report.run_id,
                    delivered = report.delivered.len(),
                    "automatic post completed"
                );
            } else {
                error!(
                    run_id = %report.run_id,
                    delivered = report.delivered.len(),
                    failed = ?report.failed,
                    "automatic post failed for some destinations"
                );
            }
        }
    }

    /// ウィンドウを進めてから「今日」のページを全配信先へ投稿する。
    ///
    /// 前進に失敗した場合は、インストール済みのウィンドウでそのまま投稿する。
    pub async fn publish_today(&self, now: DateTime<Utc>) -> PublishReport {
        let run_id = Uuid::new_v4();

        if let Err(error) = self.cache.advance(now).await {
            warn!(%run_id, error = %error, "window advance failed; posting from previous window");
        }

        let page = match self.cache.today().await {
            Ok(page) => page,
            Err(error) => {
                error!(%run_id, error = %error, "today's page is unavailable");
                for _ in &self.destinations {
                    self.metrics.autopost_failures.inc();
                }
                return PublishReport {
                    run_id,
                    delivered: Vec::new(),
                    failed: self.destinations.clone(),
                };
            }
        };

        let results = join_all(self.destinations.iter().map(|&destination| {
            let publisher = Arc::clone(&self.publisher);
            let page = Arc::clone(&page);
            async move { (destination, publisher.publish(destination, &page).await) }
        }))
        .await;

        let mut report = PublishReport {
            run_id,
            delivered: Vec::new(),
            failed: Vec::new(),
        };
        for (destination, result) in results {
            match result {
                Ok(()) => {
                    self.metrics.autoposts.inc();
                    report.delivered.push(destination);
                }
                Err(error) => {
                    self.metrics.autopost_failures.inc();
                    warn!(%run_id, destination, error = %error, "failed to publish page");
                    report.failed.push(destination);
                }
            }
        }

        report
    }
}
