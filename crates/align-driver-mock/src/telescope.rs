//! Mock pointing component.

use crate::journal::{CommandJournal, DeviceCommand};
use align_core::capabilities::Telescope;
use align_core::types::{CatalogSearch, SlewRequest};
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{sleep, Duration};
use tracing::debug;

/// Mock telescope mount with a fixed boresight angle.
///
/// Slews take `slew_time` and always settle unless `fail_slews` is set.
pub struct MockTelescope {
    journal: CommandJournal,
    boresight_angle: RwLock<f64>,
    offsets: RwLock<(f64, f64)>,
    catalog_target: RwLock<String>,
    slew_time: Duration,
    fail_slews: AtomicBool,
    fail_offsets: AtomicBool,
}

impl MockTelescope {
    /// Telescope with a 90° boresight angle, i.e. zero de-rotation.
    pub fn new(journal: CommandJournal) -> Self {
        Self {
            journal,
            boresight_angle: RwLock::new(90.0),
            offsets: RwLock::new((0.0, 0.0)),
            catalog_target: RwLock::new("HD 185975".to_string()),
            slew_time: Duration::from_millis(5),
            fail_slews: AtomicBool::new(false),
            fail_offsets: AtomicBool::new(false),
        }
    }

    pub fn set_boresight_angle(&self, angle: f64) {
        *self.boresight_angle.write() = angle;
    }

    pub fn set_catalog_target(&self, name: impl Into<String>) {
        *self.catalog_target.write() = name.into();
    }

    pub fn fail_slews(&self, fail: bool) {
        self.fail_slews.store(fail, Ordering::SeqCst);
    }

    pub fn fail_offsets(&self, fail: bool) {
        self.fail_offsets.store(fail, Ordering::SeqCst);
    }

    /// Accumulated (az, el) offset in arcsec.
    pub fn current_offsets(&self) -> (f64, f64) {
        *self.offsets.read()
    }
}

#[async_trait]
impl Telescope for MockTelescope {
    async fn slew(&self, request: &SlewRequest) -> Result<()> {
        if self.fail_slews.load(Ordering::SeqCst) {
            bail!("MockTelescope: slew to '{}' failed", request.target.name());
        }
        debug!(target = request.target.name(), "MockTelescope: slewing");
        sleep(self.slew_time).await;
        *self.offsets.write() = (0.0, 0.0);
        self.journal.record(DeviceCommand::Slew(request.clone()));
        Ok(())
    }

    async fn find_target(&self, search: &CatalogSearch) -> Result<String> {
        self.journal.record(DeviceCommand::FindTarget(search.clone()));
        Ok(self.catalog_target.read().clone())
    }

    async fn boresight_angle(&self) -> Result<f64> {
        Ok(*self.boresight_angle.read())
    }

    async fn offset_azel(&self, az: f64, el: f64) -> Result<()> {
        if self.fail_offsets.load(Ordering::SeqCst) {
            bail!("MockTelescope: offset rejected");
        }
        {
            let mut offsets = self.offsets.write();
            offsets.0 += az;
            offsets.1 += el;
        }
        self.journal.record(DeviceCommand::OffsetAzEl { az, el });
        Ok(())
    }

    async fn clear_offsets(&self) -> Result<()> {
        if self.fail_offsets.load(Ordering::SeqCst) {
            bail!("MockTelescope: clear offsets rejected");
        }
        *self.offsets.write() = (0.0, 0.0);
        self.journal.record(DeviceCommand::ClearOffsets);
        Ok(())
    }
}
