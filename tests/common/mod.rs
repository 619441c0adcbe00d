//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use align_core::types::HexapodPosition;
use align_driver_mock::{DonutScene, MockBench};
use std::time::Duration;
use wavefront_align::{AlignmentConfig, AlignmentOrchestrator, Devices};

pub fn devices(bench: &MockBench) -> Devices {
    Devices {
        telescope: bench.telescope.clone(),
        hexapod: bench.hexapod.clone(),
        camera: bench.camera.clone(),
        status: bench.status.clone(),
        store: bench.store.clone(),
    }
}

pub fn orchestrator(bench: &MockBench) -> AlignmentOrchestrator {
    AlignmentOrchestrator::new(devices(bench))
}

/// Default configuration with verification polling fast enough for tests.
pub fn test_config() -> AlignmentConfig {
    let mut config = AlignmentConfig::default();
    config.verification.poll_interval = Duration::from_millis(1);
    config.verification.max_polls = 5;
    config
}

/// Scene whose best focus sits `z` mm away from the hexapod's start position.
pub fn defocused_scene(z: f64) -> DonutScene {
    DonutScene {
        best_focus: HexapodPosition { x: 0.0, y: 0.0, z },
        ..DonutScene::default()
    }
}

/// Scene with no star at all.
pub fn blank_scene() -> DonutScene {
    DonutScene {
        surface_brightness: 0.0,
        ..DonutScene::default()
    }
}
