//! Mock camera rendering synthetic donuts into a frame store.

use crate::hexapod::MockHexapod;
use crate::journal::{CommandJournal, DeviceCommand};
use crate::scene::DonutScene;
use align_core::capabilities::Camera;
use align_core::frame::FrameStore;
use align_core::types::ExposureRequest;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::debug;

/// First exposure id handed out by a fresh camera.
pub const FIRST_EXPOSURE_ID: u64 = 2024010100001;

/// Mock camera whose frames depend on where the hexapod is.
///
/// Each exposure renders the [`DonutScene`] at the hexapod's current position
/// and writes it to the shared frame store under a fresh exposure id.
pub struct MockCamera {
    journal: CommandJournal,
    hexapod: Arc<MockHexapod>,
    store: Arc<dyn FrameStore>,
    scene: DonutScene,
    next_id: AtomicU64,
    readout_ms: AtomicU64,
    fail_exposures: AtomicBool,
}

impl MockCamera {
    pub fn new(
        journal: CommandJournal,
        hexapod: Arc<MockHexapod>,
        store: Arc<dyn FrameStore>,
        scene: DonutScene,
    ) -> Self {
        Self {
            journal,
            hexapod,
            store,
            scene,
            next_id: AtomicU64::new(FIRST_EXPOSURE_ID),
            readout_ms: AtomicU64::new(1),
            fail_exposures: AtomicBool::new(false),
        }
    }

    /// Simulated exposure plus readout time.
    pub fn set_readout(&self, readout: Duration) {
        self.readout_ms
            .store(readout.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_exposures(&self, fail: bool) {
        self.fail_exposures.store(fail, Ordering::SeqCst);
    }

    pub fn scene(&self) -> &DonutScene {
        &self.scene
    }
}

#[async_trait]
impl Camera for MockCamera {
    async fn take_exposure(&self, request: &ExposureRequest) -> Result<u64> {
        if self.fail_exposures.load(Ordering::SeqCst) {
            bail!("MockCamera: shutter fault during {} exposure", request.kind);
        }
        sleep(Duration::from_millis(self.readout_ms.load(Ordering::SeqCst))).await;

        let exposure_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = self.scene.render(&self.hexapod.current(), exposure_id)?;
        self.store.save(exposure_id, &frame)?;

        debug!(
            exposure_id,
            kind = %request.kind,
            group_id = %request.group_id,
            "MockCamera: exposure complete"
        );
        self.journal.record(DeviceCommand::Exposure {
            kind: request.kind,
            exposure_id,
            group_id: request.group_id.clone(),
        });
        Ok(exposure_id)
    }
}
