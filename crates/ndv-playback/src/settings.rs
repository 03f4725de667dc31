//! Per-axis playback settings: fps, loop mode, frame range.

use crate::PlaybackError;
use ndv_core::AxisRange;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// What happens when playback reaches a frame-range boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Stop at the boundary.
    Once,
    /// Wrap around to the opposite boundary.
    #[default]
    Loop,
    /// Reverse direction at the boundary.
    BackAndForth,
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopMode::Once => "once",
            LoopMode::Loop => "loop",
            LoopMode::BackAndForth => "back_and_forth",
        };
        f.write_str(name)
    }
}

/// Snapshot of one axis's playback settings.
///
/// `fps` is signed: the sign encodes the play direction, the magnitude
/// the frame rate, and exactly `0.0` is a stop request rather than a
/// speed. `frame_range` is an inclusive `(min, max)` window restricting
/// playback to a sub-range of the axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    pub fps: f64,
    pub loop_mode: LoopMode,
    pub frame_range: Option<(f64, f64)>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            fps: 10.0,
            loop_mode: LoopMode::Loop,
            frame_range: None,
        }
    }
}

/// A single settings change, published to subscribers by the setter
/// that performed it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingsEvent {
    FpsChanged(f64),
    LoopModeChanged(LoopMode),
    FrameRangeChanged(Option<(f64, f64)>),
}

/// Trait for components that need to respond to settings changes.
pub trait SettingsSubscriber: Send + Sync {
    fn on_settings_changed(&self, event: &SettingsEvent);
}

/// Playback settings holder for one axis.
///
/// Each axis keeps its own last-used speed, direction, mode and frame
/// range across play/stop cycles. Setters validate, store, then
/// publish the change synchronously to live subscribers.
#[derive(Default)]
pub struct AxisSettings {
    state: RwLock<PlaybackSettings>,
    subscribers: RwLock<Vec<Weak<dyn SettingsSubscriber>>>,
}

impl AxisSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PlaybackSettings {
        *self.state.read()
    }

    pub fn fps(&self) -> f64 {
        self.state.read().fps
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.state.read().loop_mode
    }

    pub fn frame_range(&self) -> Option<(f64, f64)> {
        self.state.read().frame_range
    }

    /// Set frames per second. Sign encodes direction; `0.0` is a stop
    /// request and is stored and published like any other value.
    pub fn set_fps(&self, fps: f64) -> Result<(), PlaybackError> {
        if !fps.is_finite() {
            return Err(PlaybackError::InvalidFps(fps));
        }
        self.state.write().fps = fps;
        tracing::debug!(fps, "fps set");
        self.publish(&SettingsEvent::FpsChanged(fps));
        Ok(())
    }

    pub fn set_loop_mode(&self, mode: LoopMode) {
        self.state.write().loop_mode = mode;
        tracing::debug!(mode = %mode, "loop mode set");
        self.publish(&SettingsEvent::LoopModeChanged(mode));
    }

    /// Set or clear the frame-range window, validated against the axis
    /// range it restricts.
    pub fn set_frame_range(
        &self,
        range: Option<(f64, f64)>,
        dims_range: AxisRange,
    ) -> Result<(), PlaybackError> {
        validate_frame_range(range, dims_range)?;
        self.state.write().frame_range = range;
        tracing::debug!(?range, "frame range set");
        self.publish(&SettingsEvent::FrameRangeChanged(range));
        Ok(())
    }

    /// Register a subscriber. Registration is weak; dropping the
    /// subscriber's `Arc` is teardown.
    pub fn subscribe(&self, subscriber: Arc<dyn SettingsSubscriber>) {
        self.subscribers.write().push(Arc::downgrade(&subscriber));
    }

    fn publish(&self, event: &SettingsEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|weak| weak.strong_count() > 0);
        for weak in subscribers.iter() {
            if let Some(subscriber) = weak.upgrade() {
                subscriber.on_settings_changed(event);
            }
        }
    }
}

/// Check a frame-range window against the axis range it restricts.
pub(crate) fn validate_frame_range(
    range: Option<(f64, f64)>,
    dims_range: AxisRange,
) -> Result<(), PlaybackError> {
    let (min, max) = match range {
        Some(range) => range,
        None => return Ok(()),
    };
    if min >= max {
        return Err(PlaybackError::FrameRangeOrder { min, max });
    }
    if min < dims_range.start || max * dims_range.step >= dims_range.stop {
        return Err(PlaybackError::FrameRangeOutOfBounds {
            min,
            max,
            start: dims_range.start,
            stop: dims_range.stop,
            step: dims_range.step,
        });
    }
    Ok(())
}

/// Resolve a frame range to the driver's `(min_point, max_point)`
/// bounds; `max_point` is exclusive, one past the inclusive maximum.
pub(crate) fn resolve_points(range: Option<(f64, f64)>, dims_range: AxisRange) -> (f64, f64) {
    let (min_point, max_point) = match range {
        Some((min, max)) => (min, max),
        None => (0.0, (dims_range.stop - dims_range.step).floor()),
    };
    (min_point, max_point + 1.0)
}
