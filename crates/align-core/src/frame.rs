//! Frames and frame storage.
//!
//! Estimators never receive pixels from the orchestrator; they get exposure
//! records and resolve them through a [`FrameStore`]. This keeps the payload that
//! crosses the isolated-worker boundary small.

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum supported width/height for frames.
pub const MAX_FRAME_DIMENSION: u32 = 16_384;

/// Single-channel image indexed `[[row, col]]`, i.e. `[[y, x]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pixels: Array2<f32>,
}

impl Frame {
    /// Build a frame from a row-major buffer of `width * height` pixels.
    pub fn new(width: u32, height: u32, pixels: Vec<f32>) -> Result<Self> {
        check_dimensions(width as usize, height as usize)?;
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame pixel count overflows"))?;
        if pixels.len() != expected {
            bail!(
                "frame buffer holds {} pixels, expected {} for {}x{}",
                pixels.len(),
                expected,
                width,
                height
            );
        }
        let pixels = Array2::from_shape_vec((height as usize, width as usize), pixels)
            .context("frame buffer does not match its shape")?;
        Ok(Self { pixels })
    }

    /// Wrap an existing `(height, width)` array.
    pub fn from_array(pixels: Array2<f32>) -> Result<Self> {
        let (rows, cols) = pixels.dim();
        check_dimensions(cols, rows)?;
        Ok(Self { pixels })
    }

    /// Frame filled with a constant value.
    pub fn filled(width: u32, height: u32, value: f32) -> Result<Self> {
        check_dimensions(width as usize, height as usize)?;
        Ok(Self {
            pixels: Array2::from_elem((height as usize, width as usize), value),
        })
    }

    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.pixels[[y, x]]
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.pixels.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut2<'_, f32> {
        self.pixels.view_mut()
    }
}

fn check_dimensions(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        bail!("frame dimensions must be non-zero, got {}x{}", width, height);
    }
    let max = MAX_FRAME_DIMENSION as usize;
    if width > max || height > max {
        bail!(
            "frame dimensions {}x{} exceed maximum {}",
            width,
            height,
            MAX_FRAME_DIMENSION
        );
    }
    Ok(())
}

/// Resolves exposure ids to frames.
pub trait FrameStore: Send + Sync {
    fn load(&self, exposure_id: u64) -> Result<Frame>;

    fn save(&self, exposure_id: u64, frame: &Frame) -> Result<()>;
}

/// Frame store held in memory, shared between a camera and an estimator.
#[derive(Default)]
pub struct MemoryFrameStore {
    frames: RwLock<HashMap<u64, Frame>>,
}

impl MemoryFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.read().is_empty()
    }

    /// Sorted list of stored exposure ids.
    pub fn exposure_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.frames.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl FrameStore for MemoryFrameStore {
    fn load(&self, exposure_id: u64) -> Result<Frame> {
        self.frames
            .read()
            .get(&exposure_id)
            .cloned()
            .ok_or_else(|| anyhow!("exposure {} not found in frame store", exposure_id))
    }

    fn save(&self, exposure_id: u64, frame: &Frame) -> Result<()> {
        self.frames.write().insert(exposure_id, frame.clone());
        Ok(())
    }
}

/// Frame store backed by a directory of `bincode`-encoded `<exposure_id>.frame` files.
///
/// This is the store the out-of-process worker opens, so both sides of the
/// worker boundary agree on where pixels live.
#[derive(Debug, Clone)]
pub struct DirectoryFrameStore {
    root: PathBuf,
}

impl DirectoryFrameStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, exposure_id: u64) -> PathBuf {
        self.root.join(format!("{exposure_id}.frame"))
    }
}

impl FrameStore for DirectoryFrameStore {
    fn load(&self, exposure_id: u64) -> Result<Frame> {
        let path = self.path_for(exposure_id);
        let bytes = fs::read(&path)
            .with_context(|| format!("failed to read frame {}", path.display()))?;
        let frame: Frame = bincode::deserialize(&bytes)
            .with_context(|| format!("failed to decode frame {}", path.display()))?;
        // Re-validate: the file may come from another writer.
        Frame::from_array(frame.pixels)
    }

    fn save(&self, exposure_id: u64, frame: &Frame) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let bytes = bincode::serialize(frame)?;
        let path = self.path_for(exposure_id);
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_mismatched_buffer() {
        let err = Frame::new(4, 4, vec![0.0; 15]).unwrap_err();
        assert!(err.to_string().contains("expected 16"));
    }

    #[test]
    fn frame_rejects_oversized_dimensions() {
        assert!(Frame::new(MAX_FRAME_DIMENSION + 1, 1, Vec::new()).is_err());
    }

    #[test]
    fn buffer_is_read_row_major() {
        let frame = Frame::new(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.view().dim(), (2, 3));
        assert_eq!(frame.get(1, 0), 2.0);
        assert_eq!(frame.get(0, 1), 4.0);
        assert_eq!(frame.get(2, 1), 6.0);
    }

    #[test]
    fn from_array_rejects_empty() {
        assert!(Frame::from_array(Array2::zeros((0, 4))).is_err());
    }

    #[test]
    fn directory_store_persists_frames() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryFrameStore::new(dir.path().join("frames"));
        let frame = Frame::new(3, 2, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

        store.save(2024010100042, &frame).unwrap();
        assert_eq!(store.load(2024010100042).unwrap(), frame);
        assert!(store.load(7).is_err());
    }

    #[test]
    fn memory_store_lists_ids_sorted() {
        let store = MemoryFrameStore::new();
        let frame = Frame::filled(2, 2, 1.0).unwrap();
        store.save(9, &frame).unwrap();
        store.save(3, &frame).unwrap();
        assert_eq!(store.exposure_ids(), vec![3, 9]);
        assert_eq!(store.len(), 2);
    }
}
