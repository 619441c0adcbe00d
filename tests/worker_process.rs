//! Isolated estimation through the real `wavefront_worker` binary.

mod common;

use align_core::frame::{DirectoryFrameStore, FrameStore};
use align_driver_mock::{DonutScene, MockBench};
use common::{defocused_scene, orchestrator, test_config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wavefront_align::config::{EstimatorBackend, WorkerTransportKind};
use wavefront_align::{AlignmentConfig, RunOutcome};

fn worker_config(frames_dir: PathBuf) -> AlignmentConfig {
    let mut config = test_config();
    config.estimator.backend = EstimatorBackend::Isolated;
    config.estimator.worker.transport = WorkerTransportKind::Process;
    config.estimator.worker.program = PathBuf::from(env!("CARGO_BIN_EXE_wavefront_worker"));
    config.estimator.timeout = Duration::from_secs(30);
    config.storage.frames_dir = frames_dir;
    config
}

fn bench_on_disk(scene: DonutScene, dir: &std::path::Path) -> MockBench {
    let store: Arc<dyn FrameStore> = Arc::new(DirectoryFrameStore::new(dir));
    MockBench::with_store(scene, store)
}

#[tokio::test]
async fn test_worker_process_closes_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let bench = bench_on_disk(defocused_scene(-0.05), dir.path());
    let mut orch = orchestrator(&bench);
    orch.configure(worker_config(dir.path().to_path_buf()))
        .await
        .unwrap();

    let report = orch.run().await.unwrap();
    orch.cleanup().await.unwrap();

    match report.outcome {
        RunOutcome::Completed {
            correction,
            residual,
            converged,
            estimator_retries,
            ..
        } => {
            assert!(converged);
            assert_eq!(estimator_retries, 0);
            assert_eq!(residual.diagnostics.estimator, "isolated");
            assert!((correction.hexapod.z + 0.05).abs() < 0.015);
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_worker_error_is_an_estimation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let bench = bench_on_disk(common::blank_scene(), dir.path());
    let start = bench.hexapod.current();
    let mut orch = orchestrator(&bench);
    orch.configure(worker_config(dir.path().to_path_buf()))
        .await
        .unwrap();

    let report = orch.run().await.unwrap();
    orch.cleanup().await.unwrap();

    match report.outcome {
        RunOutcome::Recovered { reason, restored } => {
            assert_eq!(reason.kind(), "EstimationError");
            assert_eq!(restored, start);
        }
        other => panic!("expected recovery, got {:?}", other),
    }
}
