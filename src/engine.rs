use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::models::{ProbeOutcome, StatusRecord};
use crate::probes::Prober;

pub struct Dispatcher {
    prober: Arc<Prober>,
    concurrency_limiter: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(prober: Prober, max_concurrency: usize) -> Self {
        Self {
            prober: Arc::new(prober),
            concurrency_limiter: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Probes every service concurrently and returns one record per service,
    /// in input order. Probe failures become down records; nothing is raised.
    pub async fn dispatch(&self, services: &[ServiceConfig]) -> Vec<StatusRecord> {
        let start_time = Instant::now();
        let mut tasks = FuturesUnordered::new();

        for (index, service) in services.iter().enumerate() {
            let prober = Arc::clone(&self.prober);
            let limiter = Arc::clone(&self.concurrency_limiter);
            let kind = service.kind();
            let url = service.url.clone();

            let handle = tokio::spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                let started = Instant::now();
                let outcome = prober.check(kind, &url).await;
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                (outcome, latency_ms, Utc::now())
            });
            tasks.push(async move { (index, handle.await) });
        }

        // Completion order is arbitrary; slots restore input order.
        let mut slots: Vec<Option<StatusRecord>> = vec![None; services.len()];
        while let Some((index, joined)) = tasks.next().await {
            let service = &services[index];
            let record = match joined {
                Ok((outcome, latency_ms, finished)) => {
                    StatusRecord::finished_at(service, outcome, Some(latency_ms), finished)
                }
                Err(e) => {
                    warn!(service = %service.name, "Probe task failed: {}", e);
                    let outcome = ProbeOutcome::down(format!("probe task failed: {e}"));
                    StatusRecord::new(service, outcome, None)
                }
            };
            slots[index] = Some(record);
        }
        let records: Vec<StatusRecord> = slots.into_iter().flatten().collect();

        info!("{}", summary_line(Utc::now(), &records));
        debug!(
            checks = records.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Dispatch cycle completed"
        );

        records
    }
}

/// `<timestamp> name verdict; name verdict;` in dispatch order.
pub fn summary_line(at: DateTime<Utc>, records: &[StatusRecord]) -> String {
    let mut line = at.to_rfc3339_opts(SecondsFormat::Secs, true);
    for record in records {
        let _ = write!(line, " {} {};", record.name, record.verdict());
    }
    line
}
