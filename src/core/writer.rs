//! Background trial writer
//!
//! One worker task drains a bounded queue into a `Sink`. Submitting never
//! waits; sink failures are logged and swallowed. `flush` is a barrier that
//! resolves once everything queued before it has been handled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::core::sink::Sink;
use crate::types::TrialRecord;

enum WriterMessage {
    Record(Box<TrialRecord>),
    Flush(oneshot::Sender<()>),
}

/// Counters for diagnostics
#[derive(Debug, Default)]
pub struct WriterStats {
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl WriterStats {
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Handle to the writer queue; cheap to clone
#[derive(Clone)]
pub struct TrialWriter {
    tx: mpsc::Sender<WriterMessage>,
    stats: Arc<WriterStats>,
}

impl std::fmt::Debug for TrialWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialWriter")
            .field("stats", &self.stats)
            .finish()
    }
}

impl TrialWriter {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(sink: Arc<dyn Sink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(WriterStats::default());
        let handle = tokio::spawn(run_worker(sink, rx, stats.clone()));
        (Self { tx, stats }, handle)
    }

    /// Queue a record; false when it was dropped
    pub fn submit(&self, record: TrialRecord) -> bool {
        match self.tx.try_send(WriterMessage::Record(Box::new(record))) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("writer queue full, dropping trial record");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!("writer worker stopped, dropping trial record");
                false
            }
        }
    }

    /// Wait for previously queued records; false on timeout
    pub async fn flush(&self, timeout: Duration) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        let barrier = async {
            self.tx.send(WriterMessage::Flush(done_tx)).await.ok()?;
            done_rx.await.ok()
        };
        match tokio::time::timeout(timeout, barrier).await {
            Ok(Some(())) => true,
            Ok(None) => {
                tracing::error!("writer worker stopped before flush");
                false
            }
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "flush timed out");
                false
            }
        }
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }
}

async fn run_worker(
    sink: Arc<dyn Sink>,
    mut rx: mpsc::Receiver<WriterMessage>,
    stats: Arc<WriterStats>,
) {
    tracing::debug!(sink = sink.name(), "trial writer started");
    while let Some(message) = rx.recv().await {
        match message {
            WriterMessage::Record(record) => match sink.append(&record).await {
                Ok(()) => {
                    stats.written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        sink = sink.name(),
                        participant = %record.participant,
                        trial = record.trial,
                        error = %e,
                        "failed to persist trial record"
                    );
                }
            },
            WriterMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("trial writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::types::{CategoryLabel, ObjectId};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<TrialRecord>>,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Sink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        async fn append(&self, record: &TrialRecord) -> Result<(), SinkError> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            if self.fail {
                return Err(SinkError::Status(503));
            }
            self.rows.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn record(trial: u32) -> TrialRecord {
        TrialRecord {
            timestamp: Utc::now(),
            participant: "p".into(),
            study_id: "s".into(),
            group_id: 0,
            phase_name: "First".into(),
            phase_index: 0,
            object: ObjectId::Brick,
            trial,
            use_text: format!("use {}", trial),
            category: CategoryLabel::Uncategorized,
            response_time_sec_phase: 1.0,
            hints_enabled_group: true,
            shown_hints: vec![],
        }
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_records() {
        let sink = Arc::new(MemorySink::default());
        let (writer, _h) = TrialWriter::spawn(sink.clone(), 16);
        for i in 1..=5 {
            assert!(writer.submit(record(i)));
        }
        assert!(writer.flush(Duration::from_secs(2)).await);

        let rows = sink.rows.lock().unwrap();
        let trials: Vec<u32> = rows.iter().map(|r| r.trial).collect();
        assert_eq!(trials, vec![1, 2, 3, 4, 5]);
        assert_eq!(writer.stats().written(), 5);
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let sink = Arc::new(MemorySink {
            fail: true,
            ..Default::default()
        });
        let (writer, _h) = TrialWriter::spawn(sink, 4);
        assert!(writer.submit(record(1)));
        assert!(writer.flush(Duration::from_secs(2)).await);
        assert_eq!(writer.stats().failed(), 1);
        assert_eq!(writer.stats().written(), 0);
    }

    #[tokio::test]
    async fn test_flush_times_out_on_slow_sink() {
        let sink = Arc::new(MemorySink {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        let (writer, _h) = TrialWriter::spawn(sink, 4);
        writer.submit(record(1));
        assert!(!writer.flush(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let sink = Arc::new(MemorySink {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let (writer, _h) = TrialWriter::spawn(sink, 1);
        let accepted = (1..=10).filter(|i| writer.submit(record(*i))).count();
        assert!(accepted < 10);
        assert_eq!(writer.stats().dropped(), (10 - accepted) as u64);
    }
}
