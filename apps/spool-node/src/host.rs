//! Demo pipeline host.
//!
//! A feeder task pushes payloads into the shared buffer while the host pulls
//! batches from the producer, runs each batch on a worker task, acks it and
//! re-issues demand for the capacity the ack freed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use spool_buffer::{Buffer, BufferError, BufferHandle, Item};
use spool_core::FailurePolicy;
use spool_producer::{
    AckError, AckOptions, AckOutcome, Acknowledger, Message, ProducerError, ProducerHandle,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;

const PRIORITY_PREFIX: &[u8] = b"priority-";

#[derive(Debug, Error)]
pub enum HostError {
    #[error("producer error: {0}")]
    Producer(#[from] ProducerError),
    #[error("ack failed: {0}")]
    Ack(#[from] AckError),
    #[error("feeder failed: {0}")]
    Feeder(#[from] BufferError),
    #[error("feeder task failed: {0}")]
    FeederTask(#[from] JoinError),
}

/// Feeder handle that aborts the task when the host stops early.
struct AbortOnDrop(JoinHandle<Result<(), BufferError>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HostSettings {
    pub workers: usize,
    pub max_demand: usize,
    pub failure_rate: f64,
    /// Number of items that must settle (succeed or be discarded) before
    /// the host stops on its own.
    pub target: usize,
    pub run_for: Duration,
}

impl From<&NodeConfig> for HostSettings {
    fn from(config: &NodeConfig) -> Self {
        Self {
            workers: config.workers,
            max_demand: config.max_demand,
            failure_rate: config.failure_rate,
            target: config.seed_items,
            run_for: config.run_for,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostReport {
    pub batches: usize,
    pub succeeded: usize,
    pub requeued: usize,
    pub discarded: usize,
}

impl HostReport {
    fn absorb(&mut self, outcome: AckOutcome) {
        self.succeeded += outcome.succeeded;
        self.requeued += outcome.requeued;
        self.discarded += outcome.discarded;
    }

    /// Items that reached a final state.
    pub fn settled(&self) -> usize {
        self.succeeded + self.discarded
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeedPlan {
    pub total: usize,
    pub chunk: usize,
    pub interval: Duration,
    pub priority_every: usize,
}

impl From<&NodeConfig> for FeedPlan {
    fn from(config: &NodeConfig) -> Self {
        Self {
            total: config.seed_items,
            chunk: config.feed_chunk,
            interval: config.feed_interval,
            priority_every: config.priority_every,
        }
    }
}

/// Payload for the `index`-th fed item. Every `priority_every`-th item is
/// marked as priority; zero disables marking.
pub fn payload(index: usize, priority_every: usize) -> Item {
    if priority_every > 0 && index % priority_every == 0 {
        Item::from(format!("priority-item-{index}"))
    } else {
        Item::from(format!("item-{index}"))
    }
}

fn is_priority(message: &Message) -> bool {
    message.data().starts_with(PRIORITY_PREFIX)
}

/// Pushes `plan.total` payloads into `buffer`, `plan.chunk` at a time.
///
/// A full buffer is not fatal; the rejected chunk is retried on the next
/// interval.
pub fn spawn_feeder(buffer: BufferHandle, plan: FeedPlan) -> JoinHandle<Result<(), BufferError>> {
    tokio::spawn(async move {
        let mut interval = time::interval(plan.interval);
        let mut next = 0usize;
        while next < plan.total {
            interval.tick().await;
            let end = (next + plan.chunk).min(plan.total);
            let chunk: Vec<Item> = (next..end)
                .map(|i| payload(i, plan.priority_every))
                .collect();
            match buffer.push(chunk) {
                Ok(()) => {
                    debug!(from = next, to = end, "fed chunk");
                    next = end;
                }
                Err(BufferError::Full { queued, capacity, .. }) => {
                    debug!(queued, capacity, "buffer full; retrying chunk");
                }
                Err(err) => return Err(err),
            }
        }
        info!(total = plan.total, "feeder finished");
        Ok(())
    })
}

/// Runs one batch through a simulated stage and acks it.
///
/// Priority messages get a requeue override before the outcome is decided,
/// so they are never lost to a discard default.
fn process_batch(
    batch: Vec<Message>,
    acker: &dyn Acknowledger,
    failure_rate: f64,
) -> Result<AckOutcome, AckError> {
    let Some(producer) = batch.first().map(|m| m.producer().clone()) else {
        return Ok(AckOutcome::default());
    };

    let mut rng = rand::thread_rng();
    let mut succeeded = Vec::with_capacity(batch.len());
    let mut failed = Vec::new();
    for mut message in batch {
        if is_priority(&message) {
            let options = acker.configure(
                &producer,
                message.ack_options(),
                AckOptions::on_failure(FailurePolicy::Requeue),
            );
            message.configure_ack(options);
        }
        if rng.gen_bool(failure_rate) {
            failed.push(message);
        } else {
            succeeded.push(message);
        }
    }

    acker.ack(&producer, succeeded, failed)
}

/// Drives the pipeline until `settings.target` items have settled, the run
/// deadline passes, `shutdown` resolves, or the producer stops delivering.
///
/// A feeder that ends with an error fails the host immediately; a feeder
/// still running when the host stops is aborted.
///
/// Batches still in flight when the loop ends are acked before returning so
/// their requeues land while the producer is still registered.
pub async fn run_host<F>(
    handle: &ProducerHandle,
    mut batches: mpsc::Receiver<Vec<Message>>,
    feeder: JoinHandle<Result<(), BufferError>>,
    acker: Arc<dyn Acknowledger>,
    settings: HostSettings,
    shutdown: F,
) -> Result<HostReport, HostError>
where
    F: Future<Output = ()>,
{
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Result<AckOutcome, AckError>>();
    let deadline = time::sleep(settings.run_for);
    tokio::pin!(deadline);
    tokio::pin!(shutdown);

    let mut feeder = AbortOnDrop(feeder);
    let mut feeding = true;

    let mut report = HostReport::default();
    let mut in_flight = 0usize;
    handle.demand(settings.workers * settings.max_demand)?;

    while report.settled() < settings.target {
        tokio::select! {
            _ = &mut deadline => {
                warn!(settled = report.settled(), target = settings.target, "run deadline reached");
                break;
            }
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            fed = &mut feeder.0, if feeding => {
                feeding = false;
                fed??;
            }
            done = done_rx.recv() => {
                // The host holds a sender, so the channel never closes here.
                let Some(done) = done else { break };
                in_flight -= 1;
                let outcome = done?;
                report.absorb(outcome);
                handle.demand(outcome.succeeded + outcome.requeued + outcome.discarded)?;
            }
            batch = batches.recv() => {
                let Some(batch) = batch else {
                    warn!("producer stopped delivering batches");
                    break;
                };
                report.batches += 1;
                in_flight += 1;
                let acker = Arc::clone(&acker);
                let done_tx = done_tx.clone();
                let failure_rate = settings.failure_rate;
                tokio::spawn(async move {
                    let _ = done_tx.send(process_batch(batch, acker.as_ref(), failure_rate));
                });
            }
        }
    }

    while in_flight > 0 {
        let Some(done) = done_rx.recv().await else { break };
        in_flight -= 1;
        report.absorb(done?);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use spool_buffer::{Buffer, BufferError, InMemoryBuffer, Item};
    use spool_core::FailurePolicy;
    use spool_producer::{AckRegistry, BufferAcknowledger, ProducerHandle, ProducerOptions};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    use super::{payload, run_host, spawn_feeder, FeedPlan, HostError, HostReport, HostSettings};

    /// Buffer that serves empty pops but rejects every push.
    struct ReadOnlyBuffer;

    impl Buffer for ReadOnlyBuffer {
        fn push(&self, _items: Vec<Item>) -> Result<(), BufferError> {
            Err(BufferError::Unavailable("read-only".into()))
        }

        fn pop(&self, _max: usize) -> Result<Vec<Item>, BufferError> {
            Ok(Vec::new())
        }

        fn len(&self) -> usize {
            0
        }

        fn clear(&self) {}
    }

    fn idle_feeder() -> JoinHandle<Result<(), BufferError>> {
        tokio::spawn(async { Ok(()) })
    }

    fn settings(target: usize, failure_rate: f64) -> HostSettings {
        HostSettings {
            workers: 2,
            max_demand: 5,
            failure_rate,
            target,
            run_for: Duration::from_secs(30),
        }
    }

    fn start(
        buffer: Arc<InMemoryBuffer>,
        on_failure: FailurePolicy,
    ) -> (ProducerHandle, mpsc::Receiver<Vec<spool_producer::Message>>, Arc<AckRegistry>) {
        let registry = Arc::new(AckRegistry::new());
        let (tx, rx) = mpsc::channel(4);
        let handle = ProducerHandle::start(
            ProducerOptions::new("host-test", buffer)
                .with_on_failure(on_failure)
                .with_retry_period(Duration::from_millis(10)),
            registry.clone(),
            tx,
        )
        .expect("producer should start");
        (handle, rx, registry)
    }

    #[test]
    fn payload_marks_every_nth_item_as_priority() {
        assert_eq!(payload(0, 10), "priority-item-0".as_bytes());
        assert_eq!(payload(7, 10), "item-7".as_bytes());
        assert_eq!(payload(20, 10), "priority-item-20".as_bytes());
        assert_eq!(payload(0, 0), "item-0".as_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn feeder_pushes_everything_in_chunks() {
        let buffer = Arc::new(InMemoryBuffer::new());
        let plan = FeedPlan {
            total: 23,
            chunk: 10,
            interval: Duration::from_millis(5),
            priority_every: 0,
        };

        spawn_feeder(buffer.clone(), plan)
            .await
            .expect("feeder task")
            .expect("feeder should finish");

        assert_eq!(buffer.len(), 23);
        assert_eq!(buffer.stats().pushed, 23);
    }

    #[tokio::test(start_paused = true)]
    async fn feeder_waits_out_a_full_buffer() {
        let buffer = Arc::new(InMemoryBuffer::with_capacity_limit(10));
        let plan = FeedPlan {
            total: 20,
            chunk: 10,
            interval: Duration::from_millis(5),
            priority_every: 0,
        };
        let feeder = spawn_feeder(buffer.clone(), plan);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.pop(10).expect("pop").len(), 10);

        feeder
            .await
            .expect("feeder task")
            .expect("feeder should finish");
        assert_eq!(buffer.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn host_settles_every_item_without_failures() {
        let buffer = Arc::new(InMemoryBuffer::from_items((0..40).map(|i| payload(i, 10)).collect::<Vec<_>>()));
        let (handle, rx, registry) = start(buffer.clone(), FailurePolicy::Discard);
        let acker = Arc::new(BufferAcknowledger::new(registry));

        let report = run_host(&handle, rx, idle_feeder(), acker, settings(40, 0.0), std::future::pending())
            .await
            .expect("host should finish");

        assert_eq!(report.succeeded, 40);
        assert_eq!(report.requeued, 0);
        assert!(buffer.is_empty());
        handle.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn priority_items_survive_a_discard_default() {
        let buffer = Arc::new(InMemoryBuffer::from_items((0..20).map(|i| payload(i, 10)).collect::<Vec<_>>()));
        let (handle, rx, registry) = start(buffer.clone(), FailurePolicy::Discard);
        let acker = Arc::new(BufferAcknowledger::new(registry));
        let mut settings = settings(18, 1.0);
        settings.run_for = Duration::from_millis(200);

        let report = run_host(&handle, rx, idle_feeder(), acker, settings, std::future::pending())
            .await
            .expect("host should finish");

        assert_eq!(report.discarded, 18);
        assert_eq!(report.succeeded, 0);
        assert!(report.requeued >= 2);
        handle.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_signal_stops_the_host() {
        let buffer = Arc::new(InMemoryBuffer::new());
        let (handle, rx, registry) = start(buffer, FailurePolicy::Discard);
        let acker = Arc::new(BufferAcknowledger::new(registry));

        let report = run_host(&handle, rx, idle_feeder(), acker, settings(10, 0.0), async {})
            .await
            .expect("host should finish");

        assert_eq!(report, HostReport::default());
        handle.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn feeder_failure_fails_the_host() {
        let buffer = Arc::new(ReadOnlyBuffer);
        let registry = Arc::new(AckRegistry::new());
        let (tx, rx) = mpsc::channel(4);
        let handle = ProducerHandle::start(
            ProducerOptions::new("host-test", buffer.clone()),
            registry.clone(),
            tx,
        )
        .expect("producer should start");
        let feeder = spawn_feeder(
            buffer,
            FeedPlan {
                total: 5,
                chunk: 5,
                interval: Duration::from_millis(5),
                priority_every: 0,
            },
        );

        let err = run_host(
            &handle,
            rx,
            feeder,
            Arc::new(BufferAcknowledger::new(registry)),
            settings(5, 0.0),
            std::future::pending(),
        )
        .await
        .expect_err("feeder cannot push");

        assert!(matches!(err, HostError::Feeder(BufferError::Unavailable(_))));
        handle.shutdown().await.expect("clean shutdown");
    }
}
