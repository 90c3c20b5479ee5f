//! Filesystem drop-off channel.
//!
//! Copies finished artifacts into a local outbox directory. This is the
//! delivery channel for headless deployments where no chat transport is
//! attached; deliveries land as `<request-id>-<file-name>` so repeated
//! sessions never collide. The source artifact is left in place, per the
//! channel contract.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use vidferry_core::ports::{DeliveryRequest, TransferChannel, TransferError, TransferResult};

/// Copy buffer size for deliveries.
const CHUNK_BYTES: usize = 256 * 1024;

/// Delivery channel that copies artifacts into a directory.
pub struct OutboxChannel {
    dir: PathBuf,
}

impl OutboxChannel {
    /// Create a channel delivering into `dir`. The directory is created
    /// on first delivery.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn delivery_name(request: &DeliveryRequest<'_>) -> String {
        let file_name = request
            .artifact
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact.mp4");
        format!("{}-{}", request.request_id, file_name)
    }
}

#[async_trait]
impl TransferChannel for OutboxChannel {
    async fn deliver(&self, request: DeliveryRequest<'_>) -> TransferResult<()> {
        let mut source = match fs::File::open(request.artifact).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TransferError::rejected(format!(
                    "artifact missing: {}",
                    request.artifact.display()
                )));
            }
            Err(e) => {
                return Err(TransferError::failed(format!("cannot open artifact: {e}")));
            }
        };
        let total = source
            .metadata()
            .await
            .map(|m| m.len())
            .map_err(|e| TransferError::failed(format!("cannot stat artifact: {e}")))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| TransferError::failed(format!("cannot create outbox: {e}")))?;

        let name = Self::delivery_name(&request);
        let staging = self.dir.join(format!("{name}.part"));
        let final_path = self.dir.join(&name);

        let mut dest = fs::File::create(&staging).await.map_err(|e| {
            TransferError::failed(format!("cannot create {}: {e}", staging.display()))
        })?;

        let mut buf = vec![0u8; CHUNK_BYTES];
        let mut done: u64 = 0;
        loop {
            if request.cancel.is_cancelled() {
                drop(dest);
                let _ = fs::remove_file(&staging).await;
                return Err(TransferError::Cancelled);
            }
            let n = source
                .read(&mut buf)
                .await
                .map_err(|e| TransferError::failed(format!("artifact read failed: {e}")))?;
            if n == 0 {
                break;
            }
            dest.write_all(&buf[..n])
                .await
                .map_err(|e| TransferError::failed(format!("outbox write failed: {e}")))?;
            done += n as u64;
            if let Some(progress) = request.progress {
                progress(done, total);
            }
        }
        dest.flush()
            .await
            .map_err(|e| TransferError::failed(format!("outbox flush failed: {e}")))?;
        drop(dest);

        fs::rename(&staging, &final_path).await.map_err(|e| {
            TransferError::failed(format!("cannot finalize {}: {e}", final_path.display()))
        })?;

        tracing::info!(
            request_id = %request.request_id,
            title = request.title,
            path = %final_path.display(),
            bytes = done,
            "Delivered to outbox"
        );
        Ok(())
    }
}
