//! Mock subsystem summary state.

use align_core::capabilities::SubsystemStatus;
use align_core::types::CorrectionLoop;
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Every subsystem and correction loop is enabled unless explicitly disabled.
#[derive(Default)]
pub struct MockSubsystems {
    disabled: RwLock<HashSet<String>>,
    disabled_loops: RwLock<HashSet<CorrectionLoop>>,
    unreachable: RwLock<HashSet<String>>,
}

impl MockSubsystems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disable(&self, subsystem: impl Into<String>) {
        self.disabled.write().insert(subsystem.into());
    }

    pub fn enable(&self, subsystem: &str) {
        self.disabled.write().remove(subsystem);
    }

    pub fn disable_loop(&self, correction: CorrectionLoop) {
        self.disabled_loops.write().insert(correction);
    }

    /// Make state queries for the subsystem fail, as if it stopped publishing.
    pub fn make_unreachable(&self, subsystem: impl Into<String>) {
        self.unreachable.write().insert(subsystem.into());
    }
}

#[async_trait]
impl SubsystemStatus for MockSubsystems {
    async fn is_enabled(&self, subsystem: &str) -> Result<bool> {
        if self.unreachable.read().contains(subsystem) {
            bail!("no summary state received from '{}'", subsystem);
        }
        Ok(!self.disabled.read().contains(subsystem))
    }

    async fn correction_enabled(&self, correction: CorrectionLoop) -> Result<bool> {
        Ok(!self.disabled_loops.read().contains(&correction))
    }
}
