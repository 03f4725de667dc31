//! Playback engine for the dims model
//!
//! Animates one axis of an [`ndv_core::Dims`] model over time: a
//! per-axis controller stores the playback settings (speed, direction,
//! loop behavior, frame-range window) and an animation driver ticks on
//! a dedicated runtime, advancing the current point and handling the
//! boundary policy of the selected loop mode.

pub mod controller;
pub mod driver;
pub mod settings;

// Re-export commonly used types
pub use controller::{PlayOpts, PlaybackController, PlaybackSubscriber};
pub use driver::AnimationDriver;
pub use settings::{AxisSettings, LoopMode, PlaybackSettings, SettingsEvent, SettingsSubscriber};

use thiserror::Error;

/// Errors that can occur when configuring or starting playback
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("frame range start {min} must be below its end {max}")]
    FrameRangeOrder { min: f64, max: f64 },

    #[error(
        "frame range ({min}, {max}) outside axis range ({start}, {stop}, {step})"
    )]
    FrameRangeOutOfBounds {
        min: f64,
        max: f64,
        start: f64,
        stop: f64,
        step: f64,
    },

    #[error("fps must be a finite number, got {0}")]
    InvalidFps(f64),

    #[error(transparent)]
    Dims(#[from] ndv_core::DimsError),
}
