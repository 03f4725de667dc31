//! Core dims model for the n-dimensional viewer
//!
//! This crate provides the shared "dims" state: one current point per
//! axis, the valid range of each axis, and the notification plumbing
//! that keeps sliders, views and the playback engine in sync.

pub mod dims;

// Re-export commonly used types
pub use dims::{
    AxisRange, BlockerGuard, Dims, DimsSubscriber, SubscriberId,
};

use thiserror::Error;

/// Errors that can occur when addressing the dims model
#[derive(Error, Debug)]
pub enum DimsError {
    #[error("axis {axis} out of bounds (model has {ndim} dimensions)")]
    InvalidAxis { axis: usize, ndim: usize },

    #[error("invalid range for axis {axis}: ({start}, {stop}, {step})")]
    InvalidRange {
        axis: usize,
        start: f64,
        stop: f64,
        step: f64,
    },
}
