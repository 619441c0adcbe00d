//! Deterministic replay of pre-recorded frames.

use align_core::capabilities::Camera;
use align_core::frame::FrameStore;
use align_core::types::ExposureRequest;
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Camera that answers each exposure with the next pre-recorded exposure id.
///
/// The frames must already be in the frame store; each id is checked before it
/// is handed out. Once the list is exhausted the camera fails, unless `repeat`
/// is set, in which case it starts over.
pub struct PlaylistCamera {
    frames: Vec<u64>,
    repeat: bool,
    cursor: Mutex<usize>,
    store: Arc<dyn FrameStore>,
}

impl PlaylistCamera {
    pub fn new(frames: Vec<u64>, repeat: bool, store: Arc<dyn FrameStore>) -> Self {
        Self {
            frames,
            repeat,
            cursor: Mutex::new(0),
            store,
        }
    }

    /// Number of exposures served so far.
    pub fn served(&self) -> usize {
        *self.cursor.lock()
    }

    fn next_id(&self) -> Result<u64> {
        let mut cursor = self.cursor.lock();
        let index = if self.repeat && !self.frames.is_empty() {
            *cursor % self.frames.len()
        } else {
            *cursor
        };
        let Some(&id) = self.frames.get(index) else {
            bail!("playlist exhausted after {} frames", self.frames.len());
        };
        *cursor += 1;
        Ok(id)
    }
}

#[async_trait]
impl Camera for PlaylistCamera {
    async fn take_exposure(&self, request: &ExposureRequest) -> Result<u64> {
        let id = self.next_id()?;
        // Surface a missing frame here rather than inside the estimator.
        self.store.load(id)?;
        info!(exposure_id = id, kind = %request.kind, "Playlist exposure");
        Ok(id)
    }
}
