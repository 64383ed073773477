//! Single-writer worker for a coordinator.
//!
//! A [`SyncHandle`] moves a [`SyncCoordinator`] onto its own thread. Callers
//! talk to it through a bounded command channel; every command carries a
//! oneshot responder. The coordinator is never touched from any other thread.

use crate::coordinator::{DeleteOutcome, SyncCoordinator, SyncSnapshot};
use crate::error::{SyncError, SyncResult};
use crate::provider::RemoteProvider;
use crate::report::SyncOutcome;
use recsync_protocol::{LocalId, RemoteId, SyncRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};

enum Command<R> {
    FullSync {
        records: Vec<R>,
        respond_to: oneshot::Sender<SyncResult<SyncOutcome<R>>>,
    },
    UploadOne {
        record: R,
        respond_to: oneshot::Sender<SyncResult<RemoteId>>,
    },
    UpdateOne {
        record: R,
        respond_to: oneshot::Sender<SyncResult<RemoteId>>,
    },
    DeleteOne {
        local_id: LocalId,
        respond_to: oneshot::Sender<SyncResult<DeleteOutcome>>,
    },
    MarkDeleted {
        local_id: LocalId,
        respond_to: oneshot::Sender<SyncResult<()>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<SyncSnapshot>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Async handle to a coordinator running on a dedicated thread.
///
/// Handles are cheap to clone. The worker stops when it receives
/// [`shutdown`](Self::shutdown) or when every handle has been dropped.
///
/// # Example
///
/// ```ignore
/// let coordinator = SyncCoordinator::<Entry, _>::open(config, provider, store)?;
/// let handle = SyncHandle::spawn(coordinator)?;
///
/// let outcome = handle.perform_full_sync(local_entries).await?;
/// ```
pub struct SyncHandle<R> {
    sender: mpsc::Sender<Command<R>>,
    syncing: Arc<AtomicBool>,
    entity_type: Arc<str>,
}

impl<R> Clone for SyncHandle<R> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            syncing: Arc::clone(&self.syncing),
            entity_type: Arc::clone(&self.entity_type),
        }
    }
}

impl<R> std::fmt::Debug for SyncHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("entity_type", &self.entity_type)
            .field("sender", &"<channel>")
            .finish()
    }
}

impl<R: SyncRecord> SyncHandle<R> {
    /// Starts a worker thread that owns `coordinator`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::WorkerSpawn`] if the thread cannot be started.
    pub fn spawn<P>(coordinator: SyncCoordinator<R, P>) -> SyncResult<Self>
    where
        P: RemoteProvider + 'static,
    {
        let entity_type: Arc<str> = Arc::from(coordinator.entity_type());
        let syncing = coordinator.syncing_flag();
        let (sender, receiver) = mpsc::channel(coordinator.config().channel_capacity);

        thread::Builder::new()
            .name(format!("recsync-{entity_type}"))
            .spawn(move || run(coordinator, receiver))
            .map_err(SyncError::WorkerSpawn)?;

        Ok(Self {
            sender,
            syncing,
            entity_type,
        })
    }

    /// Returns the entity type served by this worker.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns true while the worker runs a full sync.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Runs a full sync on the worker.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SyncInProgress`] without queueing if a pass is
    /// running, or [`SyncError::WorkerClosed`] if the worker has stopped.
    pub async fn perform_full_sync(&self, records: Vec<R>) -> SyncResult<SyncOutcome<R>> {
        if self.is_syncing() {
            return Err(SyncError::SyncInProgress {
                entity_type: self.entity_type.to_string(),
            });
        }
        self.request(|respond_to| Command::FullSync {
            records,
            respond_to,
        })
        .await?
    }

    /// Uploads a new record. See [`SyncCoordinator::upload_one`].
    ///
    /// # Errors
    ///
    /// Returns the coordinator's error, or [`SyncError::WorkerClosed`].
    pub async fn upload_one(&self, record: R) -> SyncResult<RemoteId> {
        self.request(|respond_to| Command::UploadOne { record, respond_to })
            .await?
    }

    /// Uploads a changed record. See [`SyncCoordinator::update_one`].
    ///
    /// # Errors
    ///
    /// Returns the coordinator's error, or [`SyncError::WorkerClosed`].
    pub async fn update_one(&self, record: R) -> SyncResult<RemoteId> {
        self.request(|respond_to| Command::UpdateOne { record, respond_to })
            .await?
    }

    /// Deletes a record remotely. See [`SyncCoordinator::delete_one`].
    ///
    /// # Errors
    ///
    /// Returns the coordinator's error, or [`SyncError::WorkerClosed`].
    pub async fn delete_one(&self, local_id: LocalId) -> SyncResult<DeleteOutcome> {
        self.request(|respond_to| Command::DeleteOne {
            local_id,
            respond_to,
        })
        .await?
    }

    /// Tombstones a record. See [`SyncCoordinator::mark_deleted_locally`].
    ///
    /// # Errors
    ///
    /// Returns the coordinator's error, or [`SyncError::WorkerClosed`].
    pub async fn mark_deleted_locally(&self, local_id: LocalId) -> SyncResult<()> {
        self.request(|respond_to| Command::MarkDeleted {
            local_id,
            respond_to,
        })
        .await?
    }

    /// Returns a copy of the coordinator's bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::WorkerClosed`] if the worker has stopped.
    pub async fn snapshot(&self) -> SyncResult<SyncSnapshot> {
        self.request(|respond_to| Command::Snapshot { respond_to })
            .await
    }

    /// Stops the worker after the commands already queued.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::WorkerClosed`] if the worker had already stopped.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.request(|respond_to| Command::Shutdown { respond_to })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command<R>,
    ) -> SyncResult<T> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(command(respond_to))
            .await
            .map_err(|_| SyncError::WorkerClosed)?;
        response.await.map_err(|_| SyncError::WorkerClosed)
    }
}

fn run<R: SyncRecord, P: RemoteProvider>(
    mut coordinator: SyncCoordinator<R, P>,
    mut receiver: mpsc::Receiver<Command<R>>,
) {
    tracing::debug!(entity_type = %coordinator.entity_type(), "sync worker started");

    // Responders whose caller went away are ignored.
    while let Some(command) = receiver.blocking_recv() {
        match command {
            Command::FullSync {
                records,
                respond_to,
            } => {
                let _ = respond_to.send(coordinator.perform_full_sync(records));
            }
            Command::UploadOne { record, respond_to } => {
                let _ = respond_to.send(coordinator.upload_one(&record));
            }
            Command::UpdateOne { record, respond_to } => {
                let _ = respond_to.send(coordinator.update_one(&record));
            }
            Command::DeleteOne {
                local_id,
                respond_to,
            } => {
                let _ = respond_to.send(coordinator.delete_one(&local_id));
            }
            Command::MarkDeleted {
                local_id,
                respond_to,
            } => {
                let _ = respond_to.send(coordinator.mark_deleted_locally(local_id));
            }
            Command::Snapshot { respond_to } => {
                let _ = respond_to.send(coordinator.snapshot());
            }
            Command::Shutdown { respond_to } => {
                let _ = respond_to.send(());
                break;
            }
        }
    }

    tracing::debug!(entity_type = %coordinator.entity_type(), "sync worker stopped");
}
