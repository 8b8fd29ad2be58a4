//! Stream Merger
//!
//! Fans a subtask's execution events and the reporter's commentary about
//! them into one ordered stream. Execution never waits on commentary: each
//! commentary stream runs as a background task pushing into the same queue
//! the execution task feeds.
//!
//! Messages are emitted in queue arrival order. Commentary tasks run one at
//! a time in the order their triggering events occurred, so commentary is
//! never reordered relative to other commentary.

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::capability::MessageStream;
use crate::plan::ProgressEvent;
use crate::runner::{RunnerEvent, SubtaskOutcome};

use super::message::Message;

/// Item of the merged stream
#[derive(Debug, Clone, PartialEq)]
pub enum MergedItem {
    Message(Message),
    /// The subtask's outcome; last item of the stream
    Finished(SubtaskOutcome),
}

/// Entries of the shared merge queue
enum QueueItem {
    Message(Message),
    /// One commentary task has finished
    SecondaryDone,
    /// The execution stream is exhausted
    PrimaryDone {
        outcome: Option<SubtaskOutcome>,
        commentary_tasks: usize,
    },
}

/// Aborts the execution task when the merged stream is dropped early
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Merge `primary` with commentary produced by `secondary_factory`.
///
/// `output` events pass through as messages immediately. Every other event
/// is offered to `secondary_factory`; a returned stream is narrated in the
/// background. The merged stream closes only after the primary stream is
/// exhausted and every commentary task it started has finished. An aborted
/// subtask closes the stream at once and cancels pending commentary.
pub fn merge<F>(primary: BoxStream<'static, RunnerEvent>, secondary_factory: F) -> BoxStream<'static, MergedItem>
where
    F: Fn(&ProgressEvent) -> Option<MessageStream> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let guard = AbortOnDrop(tokio::spawn(drive_primary(primary, secondary_factory, tx)));

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut queue = UnboundedReceiverStream::new(rx);
        let mut outcome: Option<SubtaskOutcome> = None;
        let mut expected: Option<usize> = None;
        let mut finished_commentary = 0usize;

        while let Some(item) = queue.next().await {
            match item {
                QueueItem::Message(message) => yield MergedItem::Message(message),
                QueueItem::SecondaryDone => finished_commentary += 1,
                QueueItem::PrimaryDone { outcome: done, commentary_tasks } => match done {
                    Some(SubtaskOutcome::Aborted(e)) => {
                        yield MergedItem::Finished(SubtaskOutcome::Aborted(e));
                        return;
                    }
                    done => {
                        outcome = done;
                        expected = Some(commentary_tasks);
                    }
                },
            }

            if expected.is_some_and(|n| finished_commentary >= n) {
                break;
            }
        }

        match outcome {
            Some(outcome) => yield MergedItem::Finished(outcome),
            None => tracing::warn!("Execution stream ended without an outcome"),
        }
    };

    stream.boxed()
}

async fn drive_primary<F>(
    mut primary: BoxStream<'static, RunnerEvent>,
    secondary_factory: F,
    tx: mpsc::UnboundedSender<QueueItem>,
) where
    F: Fn(&ProgressEvent) -> Option<MessageStream> + Send + 'static,
{
    let mut commentary = JoinSet::new();
    let mut launched = 0usize;
    let mut previous: Option<oneshot::Receiver<()>> = None;
    let mut outcome = None;

    while let Some(event) = primary.next().await {
        let event = match event {
            RunnerEvent::Finished(SubtaskOutcome::Aborted(e)) => {
                commentary.abort_all();
                let _ = tx.send(QueueItem::PrimaryDone {
                    outcome: Some(SubtaskOutcome::Aborted(e)),
                    commentary_tasks: 0,
                });
                return;
            }
            RunnerEvent::Finished(done) => {
                outcome = Some(done);
                break;
            }
            RunnerEvent::Progress(event) => event,
        };

        if let Some(message) = Message::from_output(&event) {
            let _ = tx.send(QueueItem::Message(message));
            continue;
        }

        let Some(narration) = secondary_factory(&event) else {
            continue;
        };
        let (done_tx, done_rx) = oneshot::channel();
        let wait_for = previous.replace(done_rx);
        let tx = tx.clone();
        launched += 1;

        commentary.spawn(async move {
            if let Some(prior) = wait_for {
                let _ = prior.await;
            }
            narrate(narration, &tx).await;
            let _ = tx.send(QueueItem::SecondaryDone);
            let _ = done_tx.send(());
        });
    }

    let _ = tx.send(QueueItem::PrimaryDone {
        outcome,
        commentary_tasks: launched,
    });

    // Keep the commentary tasks alive until they drain.
    while commentary.join_next().await.is_some() {}
}

async fn narrate(mut narration: MessageStream, tx: &mpsc::UnboundedSender<QueueItem>) {
    while let Some(item) = narration.next().await {
        match item {
            Ok(message) => {
                if tx.send(QueueItem::Message(message)).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!("Commentary generation failed: {:#}", e);
                let _ = tx.send(QueueItem::Message(Message::error(format!(
                    "(commentary unavailable: {})",
                    e
                ))));
                return;
            }
        }
    }
}
