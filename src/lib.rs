//! Curvature wavefront sensing and hexapod alignment.
//!
//! The crate drives a telescope's focus hexapod into alignment: it takes an
//! intra/extra-focal pair of donut images, estimates coma and defocus, and
//! converts the estimate into a clipped hexapod correction plus a compensating
//! telescope pointing offset, repeating until the residual is inside the
//! configured thresholds.
//!
//! - [`config`]: Figment-loaded [`AlignmentConfig`]
//! - [`orchestrator`]: the run state machine and recovery
//! - [`estimator`]: in-process and worker-isolated wavefront estimators
//! - [`optics`]: de-rotation, sensitivity transform and correction policy
//! - [`feasibility`]: subsystem precondition gate
//! - [`playlist`]: replay of pre-recorded frames
//!
//! Device capabilities and the shared data model live in `align-core`; a
//! simulated bench lives in `align-driver-mock`.

pub mod config;
pub mod estimator;
pub mod feasibility;
pub mod logging;
pub mod optics;
pub mod orchestrator;
pub mod outcome;
pub mod playlist;

pub use config::AlignmentConfig;
pub use estimator::{build_estimator, EstimatorOptions, WavefrontEstimator};
pub use orchestrator::{AlignmentOrchestrator, Devices, RunCanceller, RunState};
pub use outcome::{RunOutcome, RunReport};

pub use align_core::error::{AlignError, AlignResult};
