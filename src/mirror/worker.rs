// FILE: src/mirror/worker.rs
//! Bounded mirror push worker.
//!
//! Local mutations never wait on the network: they enqueue a job here
//! and report their own result immediately. Each job carries a oneshot
//! completion channel, so a caller that *does* care (shutdown, tests)
//! can hold the ticket and await it. Pushes may be reordered or
//! coalesced relative to each other — the remote is an eventually
//! consistent mirror, never a synchronization point.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::mirror::MirrorClient;
use crate::storage::paths::StorageRoots;

const MIRROR_QUEUE_CAPACITY: usize = 64;

#[derive(Debug)]
pub enum MirrorJob {
    /// Push the whole database file to its fixed remote path.
    PushDatabase,
    /// Push one local file to a remote path.
    PushFile { local: PathBuf, remote: String },
    /// Remove a remote file.
    DeleteRemote { remote: String },
    /// Push the database and every storage root.
    PushAll,
    /// Pull the database and every storage root.
    PullAll,
}

struct MirrorRequest {
    job: MirrorJob,
    respond_to: oneshot::Sender<bool>,
}

/// Awaitable completion of an enqueued mirror job. Dropping it is the
/// fire-and-forget case; the job still runs.
pub struct MirrorTicket {
    rx: oneshot::Receiver<bool>,
}

impl MirrorTicket {
    /// Wait for the job to finish. A dropped worker counts as failure.
    pub async fn wait(self) -> bool {
        self.rx.await.unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct MirrorHandle {
    tx: mpsc::Sender<MirrorRequest>,
}

impl MirrorHandle {
    /// Enqueue a job without blocking. A full queue drops the job (and
    /// the ticket resolves to failure) — backpressure, not deadlock.
    pub fn enqueue(&self, job: MirrorJob) -> MirrorTicket {
        let (respond_to, rx) = oneshot::channel();
        if let Err(e) = self.tx.try_send(MirrorRequest { job, respond_to }) {
            tracing::warn!("[Mirror] Dropping job, queue unavailable: {}", e);
        }
        MirrorTicket { rx }
    }
}

/// Spawn the worker task. The handle is cheap to clone; dropping every
/// handle shuts the worker down after it drains the queue.
pub fn spawn_mirror_worker(
    client: Arc<MirrorClient>,
    roots: StorageRoots,
    db_path: Option<PathBuf>,
    include_variants: bool,
) -> (MirrorHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<MirrorRequest>(MIRROR_QUEUE_CAPACITY);

    let handle = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let ok = run_job(&client, &roots, db_path.as_ref(), include_variants, request.job).await;
            let _ = request.respond_to.send(ok);
        }
        tracing::debug!("[Mirror] Worker shutting down");
    });

    (MirrorHandle { tx }, handle)
}

async fn run_job(
    client: &MirrorClient,
    roots: &StorageRoots,
    db_path: Option<&PathBuf>,
    include_variants: bool,
    job: MirrorJob,
) -> bool {
    match job {
        MirrorJob::PushDatabase => match db_path {
            Some(db_path) => client.upload_database(db_path).await,
            None => {
                tracing::warn!("[Mirror] PushDatabase without a database backend");
                false
            }
        },
        MirrorJob::PushFile { local, remote } => client.put(&local, &remote).await,
        MirrorJob::DeleteRemote { remote } => client.delete(&remote).await,
        MirrorJob::PushAll => {
            let mut success = client.init_remote_structure(include_variants).await;
            if let Some(db_path) = db_path {
                success &= client.upload_database(db_path).await;
            }
            success &= client.upload_directory(&roots.records, "records").await;
            success &= client.upload_directory(&roots.data, "assets").await;
            if include_variants {
                success &= client.upload_directory(&roots.variants, "variants").await;
            }
            success
        }
        MirrorJob::PullAll => {
            let mut success = true;
            if let Some(db_path) = db_path {
                success &= client.download_database(db_path).await;
            }
            success &= client.download_directory("records", &roots.records).await;
            success &= client.download_directory("assets", &roots.data).await;
            if include_variants {
                success &= client.download_directory("variants", &roots.variants).await;
            }
            success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Always-succeeding HTTP stub; counts requests.
    async fn spawn_ok_stub() -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_inner = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                hits_inner.fetch_add(1, Ordering::SeqCst);
                let mut chunk = [0u8; 8192];
                let _ = socket.read(&mut chunk).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn test_roots(base: &std::path::Path) -> StorageRoots {
        StorageRoots {
            records: base.join("Records"),
            data: base.join("Data"),
            variants: base.join("Variants"),
        }
    }

    #[tokio::test]
    async fn ticket_resolves_when_job_completes() {
        let (url, hits) = spawn_ok_stub().await;
        let client = Arc::new(
            MirrorClient::new(&url, "tester", "secret", "vault")
                .unwrap()
                .with_retry_delay(Duration::from_millis(10)),
        );

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("asset.bin");
        std::fs::write(&file, b"payload").unwrap();

        let (handle, worker) = spawn_mirror_worker(client, test_roots(dir.path()), None, false);

        let ticket = handle.enqueue(MirrorJob::PushFile {
            local: file,
            remote: "assets/asset.bin".to_string(),
        });
        assert!(ticket.wait().await);
        assert!(hits.load(Ordering::SeqCst) >= 1);

        drop(handle);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn push_database_without_db_path_fails_cleanly() {
        let (url, _hits) = spawn_ok_stub().await;
        let client = Arc::new(MirrorClient::new(&url, "tester", "secret", "vault").unwrap());
        let dir = tempfile::tempdir().unwrap();

        let (handle, worker) = spawn_mirror_worker(client, test_roots(dir.path()), None, false);
        assert!(!handle.enqueue(MirrorJob::PushDatabase).wait().await);

        drop(handle);
        worker.await.unwrap();
    }
}
