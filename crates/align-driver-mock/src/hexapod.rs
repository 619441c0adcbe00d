//! Mock focus hexapod.

use crate::journal::{CommandJournal, DeviceCommand};
use align_core::capabilities::FocusHexapod;
use align_core::types::{HexapodOffset, HexapodPosition};
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::time::{sleep, Duration};
use tracing::debug;

/// Mock hexapod with position tracking and a configurable settling behaviour.
///
/// After every accepted move, `in_position` reports `false` for `settle_polls`
/// polls before reporting `true`.
pub struct MockHexapod {
    journal: CommandJournal,
    position: RwLock<HexapodPosition>,
    move_time: Duration,
    settle_polls: AtomicU32,
    polls_remaining: AtomicU32,
    never_settles: AtomicBool,
    fail_offsets: AtomicBool,
    fail_moves: AtomicBool,
}

impl MockHexapod {
    pub fn new(journal: CommandJournal) -> Self {
        Self::at(journal, HexapodPosition::default())
    }

    /// Hexapod starting at the given position.
    pub fn at(journal: CommandJournal, position: HexapodPosition) -> Self {
        Self {
            journal,
            position: RwLock::new(position),
            move_time: Duration::from_millis(1),
            settle_polls: AtomicU32::new(1),
            polls_remaining: AtomicU32::new(0),
            never_settles: AtomicBool::new(false),
            fail_offsets: AtomicBool::new(false),
            fail_moves: AtomicBool::new(false),
        }
    }

    /// Current position without going through the async capability.
    pub fn current(&self) -> HexapodPosition {
        *self.position.read()
    }

    pub fn set_settle_polls(&self, polls: u32) {
        self.settle_polls.store(polls, Ordering::SeqCst);
    }

    pub fn set_never_settles(&self, never: bool) {
        self.never_settles.store(never, Ordering::SeqCst);
    }

    /// Reject relative offsets.
    pub fn fail_offsets(&self, fail: bool) {
        self.fail_offsets.store(fail, Ordering::SeqCst);
    }

    /// Reject absolute moves, which is what recovery uses.
    pub fn fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    fn start_settling(&self) {
        self.polls_remaining
            .store(self.settle_polls.load(Ordering::SeqCst), Ordering::SeqCst);
    }
}

#[async_trait]
impl FocusHexapod for MockHexapod {
    async fn position(&self) -> Result<HexapodPosition> {
        Ok(self.current())
    }

    async fn offset(&self, offset: HexapodOffset) -> Result<()> {
        if self.fail_offsets.load(Ordering::SeqCst) {
            bail!("MockHexapod: offset rejected");
        }
        sleep(self.move_time).await;
        let target = self.current() + offset;
        *self.position.write() = target;
        debug!(x = target.x, y = target.y, z = target.z, "MockHexapod: offset applied");
        self.journal.record(DeviceCommand::HexapodOffset(offset));
        self.start_settling();
        Ok(())
    }

    async fn move_to(&self, position: HexapodPosition) -> Result<()> {
        if self.fail_moves.load(Ordering::SeqCst) {
            bail!("MockHexapod: controller offline");
        }
        sleep(self.move_time).await;
        *self.position.write() = position;
        self.journal.record(DeviceCommand::HexapodMove(position));
        self.start_settling();
        Ok(())
    }

    async fn in_position(&self) -> Result<bool> {
        if self.never_settles.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let remaining = self.polls_remaining.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(true);
        }
        self.polls_remaining.store(remaining - 1, Ordering::SeqCst);
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offsets_accumulate_and_settle() {
        let journal = CommandJournal::new();
        let hexapod = MockHexapod::new(journal.clone());
        hexapod.set_settle_polls(2);

        hexapod.offset(HexapodOffset::focus(0.8)).await.unwrap();
        hexapod.offset(HexapodOffset::focus(-0.3)).await.unwrap();
        assert!((hexapod.current().z - 0.5).abs() < 1e-12);

        assert!(!hexapod.in_position().await.unwrap());
        assert!(!hexapod.in_position().await.unwrap());
        assert!(hexapod.in_position().await.unwrap());
        assert_eq!(journal.hexapod_offsets().len(), 2);
    }

    #[tokio::test]
    async fn failed_moves_are_not_journaled() {
        let journal = CommandJournal::new();
        let hexapod = MockHexapod::new(journal.clone());
        hexapod.fail_moves(true);
        assert!(hexapod.move_to(HexapodPosition::default()).await.is_err());
        assert!(journal.is_empty());
    }
}
