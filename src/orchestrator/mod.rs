//! Closed-loop alignment engine.
//!
//! [`AlignmentOrchestrator`] owns the device handles and the estimator and
//! drives one run at a time through the [`RunState`] machine:
//!
//! 1. feasibility gate (refuses before anything moves)
//! 2. slew, then snapshot of the hexapod position
//! 3. per iteration: intra/extra pair, estimate, correction, verification
//! 4. any failure after the snapshot goes through [`recovery::recover`]
//!
//! Cancellation is cooperative: every device call and wait is raced against a
//! `watch` channel flipped by [`RunCanceller::cancel`].

pub mod recovery;
pub mod state;

pub use recovery::RecoveryPlan;
pub use state::RunState;

use crate::config::{AlignmentConfig, TargetConfig};
use crate::estimator::{build_estimator, EstimatorOptions, WavefrontEstimator};
use crate::feasibility::FeasibilityGate;
use crate::optics::{
    derotation_angle, hexapod_offset_for, CorrectionDecision, CorrectionPolicy,
    SensitivityTransform,
};
use crate::outcome::{RunOutcome, RunReport};
use crate::playlist::PlaylistCamera;
use align_core::capabilities::{Camera, FocusHexapod, SubsystemStatus, Telescope};
use align_core::error::{AlignError, AlignResult};
use align_core::frame::FrameStore;
use align_core::types::{
    AberrationEstimate, CorrectionVector, ExposureKind, ExposureRecord, ExposureRequest,
    HexapodOffset, HexapodPosition, ImagePair, SlewRequest, SlewTarget,
};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Reason used for the in-focus image taken after convergence.
const FINAL_IMAGE_REASON: &str = "FINAL_INFOCUS";

/// Device handles the engine drives.
#[derive(Clone)]
pub struct Devices {
    pub telescope: Arc<dyn Telescope>,
    pub hexapod: Arc<dyn FocusHexapod>,
    pub camera: Arc<dyn Camera>,
    pub status: Arc<dyn SubsystemStatus>,
    /// Where exposures land, read back by the estimators
    pub store: Arc<dyn FrameStore>,
}

/// Handle for cancelling the run in progress from another task.
#[derive(Clone)]
pub struct RunCanceller {
    tx: Arc<watch::Sender<bool>>,
}

impl RunCanceller {
    /// Request cancellation. Takes effect at the next suspension point.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct AlignmentOrchestrator {
    devices: Devices,
    config: Option<Arc<AlignmentConfig>>,
    estimator: Option<Arc<dyn WavefrontEstimator>>,
    /// Estimator supplied by the host; never rebuilt nor shut down here
    injected: Option<Arc<dyn WavefrontEstimator>>,
    camera: Arc<dyn Camera>,
    state: RunState,
    cancel: Arc<watch::Sender<bool>>,
}

impl AlignmentOrchestrator {
    pub fn new(devices: Devices) -> Self {
        let (tx, _rx) = watch::channel(false);
        let camera = devices.camera.clone();
        Self {
            devices,
            config: None,
            estimator: None,
            injected: None,
            camera,
            state: RunState::Unconfigured,
            cancel: Arc::new(tx),
        }
    }

    /// Use `estimator` instead of the backend selected by configuration.
    pub fn with_estimator(mut self, estimator: Arc<dyn WavefrontEstimator>) -> Self {
        self.injected = Some(estimator);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> Option<&AlignmentConfig> {
        self.config.as_deref()
    }

    pub fn canceller(&self) -> RunCanceller {
        RunCanceller {
            tx: self.cancel.clone(),
        }
    }

    /// Validate and install the configuration for the next run.
    ///
    /// Rejected configurations leave the previous one in place. The
    /// feasibility gate runs here in advisory mode only; the run repeats it
    /// and refuses to start if it fails.
    pub async fn configure(&mut self, config: AlignmentConfig) -> AlignResult<()> {
        if let Err(e) = config.validate() {
            let err = AlignError::from(e);
            error!(error = %err, "Rejected alignment configuration");
            return Err(err);
        }
        let config = Arc::new(config);

        if self.injected.is_none() {
            if let Some(previous) = self.estimator.take() {
                if let Err(e) = previous.shutdown().await {
                    warn!(error = %e, "Previous estimator did not shut down cleanly");
                }
            }
        }
        let estimator = match &self.injected {
            Some(estimator) => estimator.clone(),
            None => build_estimator(
                &config.estimator,
                &config.storage,
                self.devices.store.clone(),
            ),
        };

        self.camera = match &config.acquisition.playlist {
            Some(playlist) => {
                info!(frames = playlist.frames.len(), repeat = playlist.repeat, "Replaying playlist");
                Arc::new(PlaylistCamera::new(
                    playlist.frames.clone(),
                    playlist.repeat,
                    self.devices.store.clone(),
                ))
            }
            None => self.devices.camera.clone(),
        };

        FeasibilityGate::new(self.devices.status.clone())
            .advise()
            .await;

        self.cancel.send_replace(false);
        self.estimator = Some(estimator.clone());
        self.config = Some(config.clone());
        self.state = RunState::Configured;
        info!(
            estimator = estimator.name(),
            dz = config.acquisition.dz,
            max_iter = config.correction.max_iter,
            "Alignment configured"
        );
        Ok(())
    }

    /// Execute one alignment run.
    ///
    /// Only configuration problems are returned as `Err`; everything that
    /// happens once the run starts is reported in the [`RunOutcome`].
    pub async fn run(&mut self) -> AlignResult<RunReport> {
        let (Some(config), Some(estimator)) = (self.config.clone(), self.estimator.clone()) else {
            return Err(AlignError::Config(
                "run requested before configure".to_string(),
            ));
        };
        if self.state != RunState::Configured {
            return Err(AlignError::Config(format!(
                "run requested in state {}; configure again first",
                self.state
            )));
        }

        let run_id = Uuid::new_v4();
        info!(%run_id, pointing = ?config.target, "Starting alignment run");

        let mut run = Run {
            config: &config,
            devices: &self.devices,
            camera: self.camera.as_ref(),
            estimator: estimator.as_ref(),
            transform: SensitivityTransform::from_config(&config.optics),
            cancel: self.cancel.subscribe(),
            run_id,
            state: RunState::Configured,
            states: vec![RunState::Configured],
            group_ids: Vec::new(),
            snapshot: None,
            telescope_offset_applied: false,
            focus_excursion: 0.0,
        };
        let outcome = run
            .execute()
            .instrument(tracing::info_span!("alignment_run", %run_id))
            .await;
        self.state = run.state;

        match &outcome {
            RunOutcome::Completed {
                iterations,
                converged,
                ..
            } => info!(iterations, converged, "Alignment run completed"),
            RunOutcome::Recovered { reason, .. } => {
                warn!(kind = reason.kind(), error = %reason, "Alignment run recovered")
            }
            RunOutcome::Failed { primary, secondary } => error!(
                kind = primary.kind(),
                error = %primary,
                secondary = ?secondary,
                "Alignment run failed"
            ),
        }

        Ok(RunReport {
            run_id,
            group_ids: run.group_ids,
            states: run.states,
            outcome,
        })
    }

    /// Release the estimator and forget the configuration.
    pub async fn cleanup(&mut self) -> AlignResult<()> {
        let estimator = self.estimator.take();
        self.config = None;
        self.camera = self.devices.camera.clone();
        self.state = RunState::Unconfigured;
        if self.injected.is_some() {
            return Ok(());
        }
        if let Some(estimator) = estimator {
            estimator
                .shutdown()
                .await
                .map_err(|e| AlignError::Device(format!("estimator shutdown failed: {:#}", e)))?;
            info!(estimator = estimator.name(), "Estimator shut down");
        }
        Ok(())
    }
}

/// State of one run in progress.
struct Run<'a> {
    config: &'a AlignmentConfig,
    devices: &'a Devices,
    camera: &'a dyn Camera,
    estimator: &'a dyn WavefrontEstimator,
    transform: SensitivityTransform,
    cancel: watch::Receiver<bool>,
    run_id: Uuid,
    state: RunState,
    states: Vec<RunState>,
    group_ids: Vec<String>,
    snapshot: Option<HexapodPosition>,
    telescope_offset_applied: bool,
    /// Net focus offset currently applied by the acquisition sequence (mm)
    focus_excursion: f64,
}

impl<'a> Run<'a> {
    fn enter(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Unexpected state transition");
        }
        info!(from = %self.state, to = %next, "State transition");
        self.state = next;
        self.states.push(next);
    }

    /// Race `fut` against cancellation.
    async fn guarded<T>(
        &self,
        stage: &'static str,
        fut: impl Future<Output = AlignResult<T>>,
    ) -> AlignResult<T> {
        let mut cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                warn!(stage, "Cancellation observed");
                Err(AlignError::Cancelled { stage: stage.to_string() })
            }
            result = fut => result,
        }
    }

    async fn execute(&mut self) -> RunOutcome {
        let gate = FeasibilityGate::new(self.devices.status.clone());
        if let Err(e) = self.guarded("feasibility", gate.check()).await {
            return self.fail(e, None);
        }
        self.enter(RunState::FeasibilityChecked);

        self.enter(RunState::Slewing);
        if let Err(e) = self.slew().await {
            return self.fail(e, None);
        }

        let snapshot = self
            .guarded("snapshot", async {
                self.devices.hexapod.position().await.map_err(|e| {
                    AlignError::Acquisition(format!("hexapod position unavailable: {:#}", e))
                })
            })
            .await;
        match snapshot {
            Ok(position) => {
                info!(x = position.x, y = position.y, z = position.z, "Hexapod snapshot taken");
                self.snapshot = Some(position);
            }
            Err(e) => return self.fail(e, None),
        }

        if self.config.acquisition.take_detection_image {
            let group_id = self.run_id.to_string();
            let reason = self.reason_for(ExposureKind::Acquisition.reason_prefix());
            if let Err(e) = self
                .expose(ExposureKind::Acquisition, &group_id, 0.0, reason)
                .await
            {
                return self.recover(e).await;
            }
        }

        match self.align().await {
            Ok(outcome) => {
                self.enter(RunState::Completed);
                outcome
            }
            Err(e) => self.recover(e).await,
        }
    }

    async fn slew(&mut self) -> AlignResult<()> {
        match &self.config.target {
            TargetConfig::CurrentPointing => {
                info!(
                    rotator_strategy = ?self.config.rotator.strategy,
                    rotator_angle = self.config.rotator.angle,
                    "Using current pointing; rotator request ignored"
                );
                Ok(())
            }
            TargetConfig::Track { name, icrs } => {
                let target = match icrs {
                    Some(c) => SlewTarget::Icrs {
                        name: name.clone(),
                        ra: c.ra,
                        dec: c.dec,
                    },
                    None => SlewTarget::Object { name: name.clone() },
                };
                self.slew_to(target).await
            }
            TargetConfig::Find(find) => {
                let search = find.search();
                info!(az = search.az, el = search.el, mag_limit = search.mag_limit, "Searching catalog");
                let name = self
                    .guarded("find_target", async {
                        self.devices.telescope.find_target(&search).await.map_err(|e| {
                            AlignError::Acquisition(format!("catalog search failed: {:#}", e))
                        })
                    })
                    .await?;
                info!(target_name = %name, "Catalog target selected");
                self.slew_to(SlewTarget::Object { name }).await
            }
        }
    }

    async fn slew_to(&self, target: SlewTarget) -> AlignResult<()> {
        let rotator = &self.config.rotator;
        let request = SlewRequest {
            target,
            rot: rotator.angle,
            rot_strategy: rotator.strategy,
            time_on_target: rotator.time_on_target,
        };
        info!(
            target_name = request.target.name(),
            rot = request.rot,
            strategy = ?request.rot_strategy,
            "Slewing"
        );
        self.guarded("slew", async {
            self.devices.telescope.slew(&request).await.map_err(|e| {
                AlignError::Acquisition(format!(
                    "slew to '{}' failed: {:#}",
                    request.target.name(),
                    e
                ))
            })
        })
        .await
    }

    /// The iteration loop. Any error returned here triggers recovery.
    async fn align(&mut self) -> AlignResult<RunOutcome> {
        let options = EstimatorOptions::from(&self.config.estimator);
        let max_iter = self.config.correction.max_iter;
        let mut total = CorrectionVector::zero();
        let mut retries = 0;
        let mut last: Option<AberrationEstimate> = None;

        for iteration in 1..=max_iter {
            info!(iteration, max_iter, "Alignment iteration");
            self.enter(RunState::AcquiringPair);
            let pair = self.acquire_pair().await?;

            self.enter(RunState::Estimating);
            let report = self
                .guarded("estimation", self.estimator.estimate(&pair, &options))
                .await?;
            retries += report.retries;
            let estimate = report.estimate;
            info!(
                iteration,
                coma_x = estimate.coma_x,
                coma_y = estimate.coma_y,
                defocus = estimate.defocus,
                flags = ?estimate.diagnostics.flags,
                "Wavefront estimate"
            );

            self.enter(RunState::Correcting);
            let raw = hexapod_offset_for(&self.transform, &estimate, pair.derotation_angle);
            debug!(
                x = raw.x,
                y = raw.y,
                z = raw.z,
                derotation_angle = pair.derotation_angle,
                "Raw hexapod offset"
            );
            let current = self
                .guarded("correction", async {
                    self.devices.hexapod.position().await.map_err(|e| {
                        AlignError::Device(format!("hexapod position unavailable: {:#}", e))
                    })
                })
                .await?;
            let decision =
                CorrectionPolicy::new(&self.config.correction, &self.transform).decide(&raw, &current)?;

            match decision {
                CorrectionDecision::Converged { residual } => {
                    info!(
                        iteration,
                        focus = residual.z,
                        coma = residual.transverse(),
                        "Converged; no correction applied"
                    );
                    self.final_image().await?;
                    return Ok(RunOutcome::Completed {
                        correction: total,
                        residual: estimate,
                        iterations: iteration,
                        converged: true,
                        estimator_retries: retries,
                    });
                }
                CorrectionDecision::Apply {
                    correction,
                    clipped,
                    ..
                } => {
                    self.apply(&correction).await?;
                    total = total.accumulate(&correction);
                    if clipped {
                        info!(iteration, "Applied clipped correction");
                    }
                    self.enter(RunState::Verifying);
                    self.verify().await?;
                }
            }
            last = Some(estimate);
        }

        warn!(max_iter, "Maximum iterations reached without convergence");
        let residual = last.ok_or_else(|| {
            AlignError::Config("correction.max_iter must be at least 1".to_string())
        })?;
        Ok(RunOutcome::Completed {
            correction: total,
            residual,
            iterations: max_iter,
            converged: false,
            estimator_retries: retries,
        })
    }

    /// Take the intra/extra pair and return the hexapod to its starting focus.
    async fn acquire_pair(&mut self) -> AlignResult<ImagePair> {
        let dz = self.config.acquisition.dz;
        let efo = self.config.acquisition.extra_focal_offset;
        let group_id = Uuid::new_v4().to_string();
        self.group_ids.push(group_id.clone());

        self.focus_offset(dz).await?;
        let reason = self.reason_for(ExposureKind::Intra.reason_prefix());
        let intra = self
            .expose(ExposureKind::Intra, &group_id, dz, reason)
            .await?;

        self.focus_offset(-(2.0 * dz + efo)).await?;
        let reason = self.reason_for(ExposureKind::Extra.reason_prefix());
        let extra = self
            .expose(ExposureKind::Extra, &group_id, -(dz + efo), reason)
            .await?;

        self.focus_offset(dz + efo).await?;

        let derotation_angle =
            derotation_angle(extra.boresight_angle, self.config.optics.camera_rotation_angle);
        info!(
            group_id = %group_id,
            intra = intra.exposure_id,
            extra = extra.exposure_id,
            derotation_angle,
            "Acquired image pair"
        );
        Ok(ImagePair {
            group_id,
            intra,
            extra,
            derotation_angle,
        })
    }

    async fn focus_offset(&mut self, dz: f64) -> AlignResult<()> {
        self.guarded("acquisition", async {
            self.devices
                .hexapod
                .offset(HexapodOffset::focus(dz))
                .await
                .map_err(|e| AlignError::Acquisition(format!("focus offset {:+.4} mm failed: {:#}", dz, e)))
        })
        .await?;
        self.focus_excursion += dz;
        debug!(dz, excursion = self.focus_excursion, "Focus offset applied");
        Ok(())
    }

    fn reason_for(&self, prefix: &str) -> String {
        match &self.config.acquisition.reason {
            Some(reason) => format!("{}_{}", prefix, reason),
            None => prefix.to_string(),
        }
    }

    async fn expose(
        &self,
        kind: ExposureKind,
        group_id: &str,
        focus_offset: f64,
        reason: String,
    ) -> AlignResult<ExposureRecord> {
        let acq = &self.config.acquisition;
        let exposure_time = match kind {
            ExposureKind::Acquisition => acq.acq_exposure_time,
            ExposureKind::Intra | ExposureKind::Extra => acq.exposure_time,
        };
        let request = ExposureRequest {
            kind,
            exposure_time,
            group_id: group_id.to_string(),
            filter: acq.filter.clone(),
            grating: acq.grating.clone(),
            reason,
            program: acq.program.clone(),
        };
        let exposure_id = self
            .guarded("exposure", async {
                self.camera.take_exposure(&request).await.map_err(|e| {
                    AlignError::Acquisition(format!("{} exposure failed: {:#}", kind, e))
                })
            })
            .await?;
        let boresight_angle = self
            .guarded("exposure", async {
                self.devices.telescope.boresight_angle().await.map_err(|e| {
                    AlignError::Acquisition(format!("boresight angle unavailable: {:#}", e))
                })
            })
            .await?;
        debug!(exposure_id, %kind, reason = %request.reason, boresight_angle, "Exposure taken");

        Ok(ExposureRecord {
            exposure_id,
            kind,
            group_id: group_id.to_string(),
            focus_offset,
            boresight_angle,
            exposure_time,
            timestamp: Utc::now(),
        })
    }

    async fn final_image(&self) -> AlignResult<()> {
        let group_id = self
            .group_ids
            .last()
            .cloned()
            .unwrap_or_else(|| self.run_id.to_string());
        let record = self
            .expose(
                ExposureKind::Acquisition,
                &group_id,
                0.0,
                self.reason_for(FINAL_IMAGE_REASON),
            )
            .await?;
        let position = self
            .guarded("final_image", async {
                self.devices.hexapod.position().await.map_err(|e| {
                    AlignError::Device(format!("hexapod position unavailable: {:#}", e))
                })
            })
            .await?;
        info!(
            exposure_id = record.exposure_id,
            x = position.x,
            y = position.y,
            z = position.z,
            "Final in-focus image; hexapod aligned position"
        );
        Ok(())
    }

    async fn apply(&mut self, correction: &CorrectionVector) -> AlignResult<()> {
        let hexapod = correction.hexapod;
        info!(x = hexapod.x, y = hexapod.y, z = hexapod.z, "Applying hexapod correction");
        self.guarded("correction", async {
            self.devices
                .hexapod
                .offset(hexapod)
                .await
                .map_err(|e| AlignError::Device(format!("hexapod rejected correction: {:#}", e)))
        })
        .await?;

        let telescope = correction.telescope;
        if !telescope.is_zero() {
            info!(az = telescope.az, el = telescope.el, "Applying telescope offset");
            // Flagged before the command so recovery clears a partially applied offset.
            self.telescope_offset_applied = true;
            self.guarded("correction", async {
                self.devices
                    .telescope
                    .offset_azel(telescope.az, telescope.el)
                    .await
                    .map_err(|e| AlignError::Device(format!("telescope rejected offset: {:#}", e)))
            })
            .await?;
        }
        Ok(())
    }

    async fn verify(&self) -> AlignResult<()> {
        let verification = &self.config.verification;
        for poll in 1..=verification.max_polls {
            let settled = self
                .guarded("verification", async {
                    self.devices.hexapod.in_position().await.map_err(|e| {
                        AlignError::Device(format!("hexapod state unavailable: {:#}", e))
                    })
                })
                .await?;
            if settled {
                debug!(poll, "Hexapod in position");
                return Ok(());
            }
            if poll < verification.max_polls {
                self.guarded("verification", async {
                    tokio::time::sleep(verification.poll_interval).await;
                    Ok(())
                })
                .await?;
            }
        }
        Err(AlignError::VerificationTimeout {
            polls: verification.max_polls,
        })
    }

    async fn recover(&mut self, primary: AlignError) -> RunOutcome {
        self.enter(RunState::Recovering);
        warn!(
            kind = primary.kind(),
            error = %primary,
            focus_excursion = self.focus_excursion,
            "Recovering from failure"
        );
        let Some(snapshot) = self.snapshot else {
            return self.fail(primary, None);
        };
        let plan = RecoveryPlan {
            snapshot,
            clear_telescope_offsets: self.telescope_offset_applied,
        };
        match recovery::recover(
            self.devices.hexapod.as_ref(),
            self.devices.telescope.as_ref(),
            &plan,
            &self.config.verification,
        )
        .await
        {
            Ok(()) => {
                self.focus_excursion = 0.0;
                self.enter(RunState::Recovered);
                RunOutcome::Recovered {
                    reason: primary,
                    restored: snapshot,
                }
            }
            Err(secondary) => {
                error!(error = %secondary, "Recovery failed");
                self.fail(primary, Some(secondary))
            }
        }
    }

    fn fail(&mut self, primary: AlignError, secondary: Option<AlignError>) -> RunOutcome {
        self.enter(RunState::Failed);
        RunOutcome::Failed { primary, secondary }
    }
}

/// Resolves once the cancel flag is set. Never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
