//! Core types and traits for the wavefront alignment engine.
//!
//! This crate holds what both the engine and the device drivers need to agree
//! on: the data model of a run, the device capability traits, frame storage and
//! the error taxonomy.

pub mod capabilities;
pub mod error;
pub mod frame;
pub mod types;

pub use error::{AlignError, AlignResult};
