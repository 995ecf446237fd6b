//! Write path: a dedicated writer thread owning the Tantivy IndexWriter.
//!
//! Callers submit operations over a channel and wait for the commit that
//! includes them. The worker drains whatever is queued (up to the batch
//! size) and commits once per batch, so concurrent writers share commits.
//! Documents are not visible to new searchers until the reader reloads.

use std::sync::Mutex;
use std::thread::JoinHandle;

use tantivy::{Index, IndexWriter, Opstamp, TantivyDocument, Term};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use entity_types::IndexSettings;

use crate::error::IndexError;

/// Key reported in write errors for whole-index operations.
const ALL_KEYS: &str = "*";

/// A single mutation of the index.
#[derive(Debug)]
pub enum WriteOp {
    /// Delete any document with `term`, then add `doc`
    Replace {
        key: String,
        term: Term,
        doc: TantivyDocument,
    },
    /// Delete any document with `term`
    Delete { key: String, term: Term },
    /// Delete every document
    DeleteAll,
}

impl WriteOp {
    fn key(&self) -> &str {
        match self {
            WriteOp::Replace { key, .. } | WriteOp::Delete { key, .. } => key,
            WriteOp::DeleteAll => ALL_KEYS,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            WriteOp::Replace { .. } => "replace",
            WriteOp::Delete { .. } => "delete",
            WriteOp::DeleteAll => "delete_all",
        }
    }
}

type Completion = oneshot::Sender<Result<Opstamp, IndexError>>;
type Pending = oneshot::Receiver<Result<Opstamp, IndexError>>;

struct WriteRequest {
    op: WriteOp,
    done: Completion,
}

/// Handle to the writer thread of one index.
pub struct IndexWriterHandle {
    kind: String,
    sender: Mutex<Option<mpsc::UnboundedSender<WriteRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IndexWriterHandle {
    /// Create the IndexWriter and start its worker thread.
    pub fn spawn(index: &Index, kind: &str, settings: &IndexSettings) -> Result<Self, IndexError> {
        let budget = settings.writer_memory_mb.saturating_mul(1024 * 1024);
        let writer: IndexWriter = index.writer(budget)?;
        let max_batch = settings.max_batch_size.max(1);

        let (sender, receiver) = mpsc::unbounded_channel();
        let worker_kind = kind.to_string();
        let worker = std::thread::Builder::new()
            .name(format!("{}-writer", kind))
            .spawn(move || run_worker(writer, receiver, max_batch, worker_kind))?;

        info!(kind, budget, max_batch, "Started index writer");
        Ok(Self {
            kind: kind.to_string(),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn submit(&self, op: WriteOp) -> Result<Pending, IndexError> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| IndexError::WriterClosed)?
            .clone()
            .ok_or(IndexError::WriterClosed)?;

        let (done, receiver) = oneshot::channel();
        sender
            .send(WriteRequest { op, done })
            .map_err(|_| IndexError::WriterClosed)?;
        Ok(receiver)
    }

    /// Submit and block until the operation is committed.
    ///
    /// Must not be called from within an async runtime; use
    /// [`execute_async`](Self::execute_async) there.
    pub fn execute(&self, op: WriteOp) -> Result<Opstamp, IndexError> {
        self.submit(op)?
            .blocking_recv()
            .map_err(|_| IndexError::WriterClosed)?
    }

    /// Submit and await the commit.
    pub async fn execute_async(&self, op: WriteOp) -> Result<Opstamp, IndexError> {
        self.submit(op)?
            .await
            .map_err(|_| IndexError::WriterClosed)?
    }

    /// Stop accepting operations, drain the queue and join the worker.
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let worker = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!(kind = %self.kind, "Index writer thread panicked");
            } else {
                debug!(kind = %self.kind, "Index writer stopped");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().map(|s| s.is_none()).unwrap_or(true)
    }
}

impl Drop for IndexWriterHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    mut writer: IndexWriter,
    mut receiver: mpsc::UnboundedReceiver<WriteRequest>,
    max_batch: usize,
    kind: String,
) {
    while let Some(first) = receiver.blocking_recv() {
        let mut batch = vec![first];
        while batch.len() < max_batch {
            match receiver.try_recv() {
                Ok(request) => batch.push(request),
                Err(_) => break,
            }
        }
        apply_batch(&mut writer, batch, &kind);
    }

    if let Err(e) = writer.wait_merging_threads() {
        warn!(kind = %kind, error = %e, "Merge threads failed on shutdown");
    }
}

/// Apply one batch and commit it; every request gets the outcome.
fn apply_batch(writer: &mut IndexWriter, batch: Vec<WriteRequest>, kind: &str) {
    let size = batch.len();
    let mut applied = Vec::with_capacity(size);

    for WriteRequest { op, done } in batch {
        let key = op.key().to_string();
        let name = op.name();
        let result = match op {
            WriteOp::Replace { term, doc, .. } => {
                writer.delete_term(term);
                writer.add_document(doc).map(|_| ())
            }
            WriteOp::Delete { term, .. } => {
                writer.delete_term(term);
                Ok(())
            }
            WriteOp::DeleteAll => writer.delete_all_documents().map(|_| ()),
        };
        match result {
            Ok(()) => applied.push((key, name, done)),
            Err(e) => {
                warn!(kind, key = %key, op = name, error = %e, "Write operation rejected");
                let _ = done.send(Err(IndexError::Write {
                    key,
                    reason: e.to_string(),
                }));
            }
        }
    }

    if applied.is_empty() {
        return;
    }

    match writer.commit() {
        Ok(opstamp) => {
            debug!(kind, opstamp, ops = applied.len(), "Committed write batch");
            for (key, name, done) in applied {
                debug!(kind, key = %key, op = name, opstamp, "Write committed");
                let _ = done.send(Ok(opstamp));
            }
        }
        Err(e) => {
            warn!(kind, ops = applied.len(), error = %e, "Commit failed, rolling back");
            if let Err(rollback) = writer.rollback() {
                warn!(kind, error = %rollback, "Rollback failed");
            }
            let reason = e.to_string();
            for (key, _, done) in applied {
                let _ = done.send(Err(IndexError::Write {
                    key,
                    reason: reason.clone(),
                }));
            }
        }
    }
}
