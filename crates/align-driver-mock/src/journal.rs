//! Journal of commands accepted by the mock devices.

use align_core::types::{
    CatalogSearch, ExposureKind, HexapodOffset, HexapodPosition, SlewRequest,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// A command accepted by one of the mock devices.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    Slew(SlewRequest),
    FindTarget(CatalogSearch),
    OffsetAzEl { az: f64, el: f64 },
    ClearOffsets,
    HexapodOffset(HexapodOffset),
    HexapodMove(HexapodPosition),
    Exposure {
        kind: ExposureKind,
        exposure_id: u64,
        group_id: String,
    },
}

impl DeviceCommand {
    /// Whether the command moved the focus mechanism.
    pub fn is_hexapod(&self) -> bool {
        matches!(
            self,
            DeviceCommand::HexapodOffset(_) | DeviceCommand::HexapodMove(_)
        )
    }
}

/// Shared, append-only record of accepted commands in arrival order.
///
/// Rejected commands are not recorded.
#[derive(Debug, Clone, Default)]
pub struct CommandJournal {
    entries: Arc<Mutex<Vec<DeviceCommand>>>,
}

impl CommandJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, command: DeviceCommand) {
        self.entries.lock().push(command);
    }

    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.entries.lock().clone()
    }

    pub fn hexapod_commands(&self) -> Vec<DeviceCommand> {
        self.entries
            .lock()
            .iter()
            .filter(|c| c.is_hexapod())
            .cloned()
            .collect()
    }

    /// Relative hexapod offsets, in order.
    pub fn hexapod_offsets(&self) -> Vec<HexapodOffset> {
        self.entries
            .lock()
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::HexapodOffset(offset) => Some(*offset),
                _ => None,
            })
            .collect()
    }

    pub fn telescope_offsets(&self) -> Vec<(f64, f64)> {
        self.entries
            .lock()
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::OffsetAzEl { az, el } => Some((*az, *el)),
                _ => None,
            })
            .collect()
    }

    pub fn exposures(&self) -> Vec<(ExposureKind, u64, String)> {
        self.entries
            .lock()
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::Exposure {
                    kind,
                    exposure_id,
                    group_id,
                } => Some((*kind, *exposure_id, group_id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
