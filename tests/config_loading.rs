//! Configuration loading from TOML files with environment overrides.

use figment::Jail;
use std::time::Duration;
use wavefront_align::config::{AlignmentConfig, EstimatorBackend, TargetConfig};
use wavefront_align::{AlignmentOrchestrator, Devices};

#[test]
fn test_file_and_env_layers() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "align.toml",
            r#"
            [target]
            mode = "find"
            az = 120.0
            el = 60.0
            mag_limit = 6.0

            [acquisition]
            dz = 0.6
            reason = "night_1"

            [estimator]
            backend = "isolated"
            timeout = "45s"

            [correction]
            max_iter = 3
            "#,
        )?;
        jail.set_env("WFALIGN_CORRECTION__MAX_ITER", "4");
        jail.set_env("WFALIGN_ACQUISITION__EXPOSURE_TIME", "20.0");

        let config = AlignmentConfig::load_from("align.toml").map_err(|e| e.to_string())?;

        assert_eq!(config.acquisition.dz, 0.6);
        assert_eq!(config.acquisition.exposure_time, 20.0);
        assert_eq!(config.acquisition.reason.as_deref(), Some("night_1"));
        assert_eq!(config.estimator.backend, EstimatorBackend::Isolated);
        assert_eq!(config.estimator.timeout, Duration::from_secs(45));
        assert_eq!(config.correction.max_iter, 4);
        match &config.target {
            TargetConfig::Find(find) => {
                assert_eq!(find.search().mag_range, 2.0);
                assert_eq!(find.az, 120.0);
            }
            other => panic!("unexpected target {:?}", other),
        }
        Ok(())
    });
}

#[test]
fn test_invalid_file_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("align.toml", "[acquisition]\ndz = -1.0\n")?;
        let err = AlignmentConfig::load_from("align.toml").unwrap_err();
        assert!(err.to_string().contains("dz"), "{}", err);
        Ok(())
    });
}

#[tokio::test]
async fn test_rejected_config_keeps_previous() {
    let bench = align_driver_mock::MockBench::default();
    let mut orch = AlignmentOrchestrator::new(Devices {
        telescope: bench.telescope.clone(),
        hexapod: bench.hexapod.clone(),
        camera: bench.camera.clone(),
        status: bench.status.clone(),
        store: bench.store.clone(),
    });
    orch.configure(AlignmentConfig::default()).await.unwrap();

    let mut bad = AlignmentConfig::default();
    bad.correction.max_iter = 0;
    let err = orch.configure(bad).await.unwrap_err();

    assert_eq!(err.kind(), "ConfigError");
    assert_eq!(orch.config().map(|c| c.correction.max_iter), Some(5));
}
