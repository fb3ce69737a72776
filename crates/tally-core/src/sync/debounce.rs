//! Debounced writer for high-frequency document mutations.
//!
//! Rapid consecutive writes to the same key within the window collapse into a
//! single sink write, with the timer reset on each new mutation. `flush`
//! forces everything pending out immediately (used on navigation-away and on
//! session teardown). A single actor task owns the pending map, so no locks
//! are held across sink writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Destination for debounced writes.
#[async_trait]
pub trait DebounceSink<T>: Send + Sync + 'static {
    async fn write(&self, key: &str, value: T);
}

enum Msg<T> {
    Schedule { key: String, value: T },
    Flush(oneshot::Sender<()>),
}

/// Handle to the debounce actor; clones share one pending map.
pub struct DebouncedWriter<T> {
    tx: mpsc::UnboundedSender<Msg<T>>,
}

impl<T> Clone for DebouncedWriter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> DebouncedWriter<T> {
    /// Spawn the actor. Must be called within a tokio runtime.
    pub fn new(window: Duration, sink: Arc<dyn DebounceSink<T>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_actor(window, sink, rx));
        Self { tx }
    }

    /// Queue a write for `key`, replacing any pending value and resetting its
    /// timer.
    pub fn schedule(&self, key: impl Into<String>, value: T) {
        let _ = self.tx.send(Msg::Schedule {
            key: key.into(),
            value,
        });
    }

    /// Write out everything pending and wait for it to land.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Msg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn run_actor<T: Send + 'static>(
    window: Duration,
    sink: Arc<dyn DebounceSink<T>>,
    mut rx: mpsc::UnboundedReceiver<Msg<T>>,
) {
    let mut pending: HashMap<String, (T, Instant)> = HashMap::new();

    loop {
        let next_deadline = pending.values().map(|(_, at)| *at).min();

        tokio::select! {
            msg = rx.recv() => match msg {
                Some(Msg::Schedule { key, value }) => {
                    pending.insert(key, (value, Instant::now() + window));
                }
                Some(Msg::Flush(ack)) => {
                    drain(&mut pending, sink.as_ref(), None).await;
                    let _ = ack.send(());
                }
                // All handles dropped: best-effort final drain.
                None => {
                    drain(&mut pending, sink.as_ref(), None).await;
                    break;
                }
            },
            () = async {
                if let Some(at) = next_deadline {
                    tokio::time::sleep_until(at).await;
                }
            }, if next_deadline.is_some() => {
                drain(&mut pending, sink.as_ref(), Some(Instant::now())).await;
            }
        }
    }
}

/// Write out entries due at `cutoff` (or everything when `None`).
async fn drain<T: Send + 'static>(
    pending: &mut HashMap<String, (T, Instant)>,
    sink: &dyn DebounceSink<T>,
    cutoff: Option<Instant>,
) {
    let due: Vec<String> = pending
        .iter()
        .filter(|(_, (_, at))| cutoff.is_none_or(|now| *at <= now))
        .map(|(key, _)| key.clone())
        .collect();

    for key in due {
        if let Some((value, _)) = pending.remove(&key) {
            sink.write(&key, value).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        writes: Mutex<Vec<(String, u32)>>,
    }

    #[async_trait]
    impl DebounceSink<u32> for Recorder {
        async fn write(&self, key: &str, value: u32) {
            self.writes.lock().unwrap().push((key.to_string(), value));
        }
    }

    const WINDOW: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn rapid_writes_collapse_to_last_value() {
        let recorder = Arc::new(Recorder::default());
        let writer = DebouncedWriter::new(WINDOW, recorder.clone());

        writer.schedule("layout-1", 1);
        writer.schedule("layout-1", 2);
        writer.schedule("layout-1", 3);
        tokio::time::sleep(WINDOW + Duration::from_millis(50)).await;

        assert_eq!(
            *recorder.writes.lock().unwrap(),
            vec![("layout-1".to_string(), 3)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timer_resets_on_each_new_mutation() {
        let recorder = Arc::new(Recorder::default());
        let writer = DebouncedWriter::new(WINDOW, recorder.clone());

        writer.schedule("layout-1", 1);
        tokio::time::sleep(WINDOW / 2).await;
        writer.schedule("layout-1", 2);
        tokio::time::sleep(WINDOW / 2).await;
        // Full window has elapsed since the first write, but not the second.
        assert!(recorder.writes.lock().unwrap().is_empty());

        tokio::time::sleep(WINDOW).await;
        assert_eq!(
            *recorder.writes.lock().unwrap(),
            vec![("layout-1".to_string(), 2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_debounce_independently() {
        let recorder = Arc::new(Recorder::default());
        let writer = DebouncedWriter::new(WINDOW, recorder.clone());

        writer.schedule("a", 1);
        writer.schedule("b", 2);
        tokio::time::sleep(WINDOW + Duration::from_millis(50)).await;

        let mut writes = recorder.writes.lock().unwrap().clone();
        writes.sort();
        assert_eq!(writes, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_immediately() {
        let recorder = Arc::new(Recorder::default());
        let writer = DebouncedWriter::new(WINDOW, recorder.clone());

        writer.schedule("layout-1", 7);
        writer.flush().await;

        assert_eq!(
            *recorder.writes.lock().unwrap(),
            vec![("layout-1".to_string(), 7)]
        );

        // Nothing left to fire after the window.
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(recorder.writes.lock().unwrap().len(), 1);
    }
}
