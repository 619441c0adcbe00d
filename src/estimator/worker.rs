//! Worker loop run by the `wavefront_worker` binary.

use crate::estimator::protocol::{handle_request, EstimateRequest, EstimateResponse};
use align_core::frame::FrameStore;
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Answer JSON-line requests from `reader` on `writer` until EOF.
///
/// A line that cannot be parsed is answered with an error response carrying
/// the nil request id; the loop keeps serving.
pub async fn serve<R, W>(reader: R, mut writer: W, store: Arc<dyn FrameStore>) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut served = 0u64;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<EstimateRequest>(&line) {
            Ok(request) => {
                debug!(request_id = %request.request_id, "Worker received request");
                let store = store.clone();
                let request_id = request.request_id;
                tokio::task::spawn_blocking(move || handle_request(&request, store.as_ref()))
                    .await
                    .unwrap_or_else(|e| {
                        EstimateResponse::error(request_id, format!("computation failed: {}", e))
                    })
            }
            Err(e) => {
                warn!(error = %e, "Malformed request");
                EstimateResponse::error(Uuid::nil(), format!("malformed request: {}", e))
            }
        };
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
        served += 1;
    }
    info!(served, "Worker input closed");
    Ok(served)
}
