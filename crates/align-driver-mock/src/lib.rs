//! Mock telescope subsystems for alignment testing.
//!
//! Provides simulated implementations of the `align-core` capabilities:
//!
//! - [`MockTelescope`] - slews, az/el offsets, fixed boresight angle
//! - [`MockHexapod`] - relative/absolute moves with a settling countdown
//! - [`MockCamera`] - renders a [`DonutScene`] at the hexapod's position
//! - [`MockSubsystems`] - enabled-state and correction-loop queries
//!
//! Every accepted command lands in a shared [`CommandJournal`], so tests can
//! assert on exactly what the engine commanded. [`MockBench`] wires a full set
//! together around one in-memory frame store.

pub mod camera;
pub mod hexapod;
pub mod journal;
pub mod scene;
pub mod status;
pub mod telescope;

pub use camera::{MockCamera, FIRST_EXPOSURE_ID};
pub use hexapod::MockHexapod;
pub use journal::{CommandJournal, DeviceCommand};
pub use scene::DonutScene;
pub use status::MockSubsystems;
pub use telescope::MockTelescope;

use align_core::frame::{FrameStore, MemoryFrameStore};
use std::sync::Arc;

/// A complete simulated bench sharing one journal and one frame store.
#[derive(Clone)]
pub struct MockBench {
    pub telescope: Arc<MockTelescope>,
    pub hexapod: Arc<MockHexapod>,
    pub camera: Arc<MockCamera>,
    pub status: Arc<MockSubsystems>,
    pub store: Arc<dyn FrameStore>,
    pub journal: CommandJournal,
}

impl MockBench {
    pub fn new(scene: DonutScene) -> Self {
        Self::with_store(scene, Arc::new(MemoryFrameStore::new()))
    }

    /// Bench whose camera writes into `store`, e.g. a directory read by a worker process.
    pub fn with_store(scene: DonutScene, store: Arc<dyn FrameStore>) -> Self {
        let journal = CommandJournal::new();
        let hexapod = Arc::new(MockHexapod::new(journal.clone()));
        let camera = Arc::new(MockCamera::new(
            journal.clone(),
            hexapod.clone(),
            store.clone(),
            scene,
        ));
        Self {
            telescope: Arc::new(MockTelescope::new(journal.clone())),
            hexapod,
            camera,
            status: Arc::new(MockSubsystems::new()),
            store,
            journal,
        }
    }
}

impl Default for MockBench {
    fn default() -> Self {
        Self::new(DonutScene::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::capabilities::{Camera, FocusHexapod};
    use align_core::types::{ExposureKind, ExposureRequest, HexapodOffset};

    fn request(kind: ExposureKind) -> ExposureRequest {
        ExposureRequest {
            kind,
            exposure_time: 20.0,
            group_id: "group-1".into(),
            filter: "empty_1".into(),
            grating: "empty_1".into(),
            reason: format!("{}_test", kind.reason_prefix()),
            program: String::new(),
        }
    }

    #[tokio::test]
    async fn camera_renders_at_hexapod_position() {
        let bench = MockBench::default();
        bench.hexapod.offset(HexapodOffset::focus(0.8)).await.unwrap();
        let id = bench
            .camera
            .take_exposure(&request(ExposureKind::Intra))
            .await
            .unwrap();

        assert_eq!(id, FIRST_EXPOSURE_ID);
        let frame = bench.store.load(id).unwrap();
        assert_eq!(frame.width(), 256);
        assert_eq!(bench.journal.exposures().len(), 1);
    }

    #[tokio::test]
    async fn exposure_ids_are_sequential() {
        let bench = MockBench::default();
        let a = bench
            .camera
            .take_exposure(&request(ExposureKind::Intra))
            .await
            .unwrap();
        let b = bench
            .camera
            .take_exposure(&request(ExposureKind::Extra))
            .await
            .unwrap();
        assert_eq!(b, a + 1);
        assert!(bench.store.load(a).is_ok());
        assert!(bench.store.load(b).is_ok());
    }
}
