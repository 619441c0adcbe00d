//! Device capabilities consumed by the alignment engine.
//!
//! Each subsystem the orchestrator drives is reached through one of these
//! traits. The wire protocol behind them is the implementor's business; the
//! engine only relies on the async command/acknowledge semantics: a returned
//! `Ok(())` means the command was accepted by the device.
//!
//! All methods return `anyhow::Result` so drivers can attach whatever context
//! their transport produces. The orchestrator maps failures into
//! [`crate::error::AlignError`] according to the stage it is in.

use crate::types::{
    CatalogSearch, CorrectionLoop, ExposureRequest, HexapodOffset, HexapodPosition, SlewRequest,
};
use anyhow::Result;
use async_trait::async_trait;

/// Pointing component: slews, offsets and boresight geometry.
#[async_trait]
pub trait Telescope: Send + Sync {
    /// Slew to the target and wait until the mount has settled.
    async fn slew(&self, request: &SlewRequest) -> Result<()>;

    /// Search the local catalog and return the name of the selected target.
    async fn find_target(&self, search: &CatalogSearch) -> Result<String>;

    /// Current angle (deg) between the elevation axis and the instrument rotator.
    async fn boresight_angle(&self) -> Result<f64>;

    /// Apply a relative, persistent az/el offset in arcsec.
    async fn offset_azel(&self, az: f64, el: f64) -> Result<()>;

    /// Remove the offsets applied with [`Telescope::offset_azel`].
    async fn clear_offsets(&self) -> Result<()>;
}

/// Focus mechanism carrying the secondary mirror.
#[async_trait]
pub trait FocusHexapod: Send + Sync {
    /// Reported position in mm.
    async fn position(&self) -> Result<HexapodPosition>;

    /// Apply a relative offset on top of the current position.
    async fn offset(&self, offset: HexapodOffset) -> Result<()>;

    /// Command an absolute position.
    async fn move_to(&self, position: HexapodPosition) -> Result<()>;

    /// Whether the last commanded move has completed.
    async fn in_position(&self) -> Result<bool>;
}

/// Science camera used to take the defocused pair.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Take one exposure and return its exposure id.
    async fn take_exposure(&self, request: &ExposureRequest) -> Result<u64>;
}

/// Read-only view of subsystem summary state.
#[async_trait]
pub trait SubsystemStatus: Send + Sync {
    /// Whether the named subsystem is in its enabled state.
    async fn is_enabled(&self, subsystem: &str) -> Result<bool>;

    /// Whether the given closed-loop correction is enabled.
    async fn correction_enabled(&self, correction: CorrectionLoop) -> Result<bool>;
}
