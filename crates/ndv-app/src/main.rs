//! Headless demo entry point
//!
//! Stands in for an embedding viewer: builds a synthetic 4-D dims
//! model, animates its time axis through the playback controller and
//! logs every frame the driver requests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use ndv_core::{Dims, DimsSubscriber};
use ndv_playback::{LoopMode, PlayOpts, PlaybackController, PlaybackSubscriber};

/// Axis animated by the demo (channel, time, y, x)
const TIME_AXIS: usize = 1;

/// Logs every frame the driver (or anyone else) writes to the model.
struct FrameLogger;

impl DimsSubscriber for FrameLogger {
    fn on_point_changed(&self, axis: usize, value: f64) {
        info!(axis, frame = value, "frame");
    }
}

/// Logs transport-level playback events.
struct TransportLogger;

impl PlaybackSubscriber for TransportLogger {
    fn on_play_started(&self, axis: usize) {
        info!(axis, "playback started");
    }
    fn on_play_stopped(&self, axis: usize) {
        info!(axis, "playback stopped");
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting dims playback demo");

    // Synthetic volume: 2 channels, 40 time points, 256x256 pixels
    let dims = Arc::new(Dims::from_shape(&[2, 40, 256, 256]));
    dims.set_axis_label(TIME_AXIS, "time")?;

    // Drivers tick on their own runtime, away from this (interactive)
    // thread
    let runtime = tokio::runtime::Runtime::new()?;
    let controller = PlaybackController::new(dims.clone(), runtime.handle().clone());

    let frame_logger = Arc::new(FrameLogger);
    dims.subscribe(frame_logger.clone());
    let transport_logger = Arc::new(TransportLogger);
    controller.subscribe(transport_logger.clone());

    info!(
        label = %dims.axis_label(TIME_AXIS)?,
        frames = dims.max_index(TIME_AXIS)? + 1,
        "animating axis"
    );

    // Loop forward at 25 fps
    controller.play(
        TIME_AXIS,
        PlayOpts {
            fps: Some(25.0),
            ..Default::default()
        },
    )?;
    std::thread::sleep(Duration::from_secs(2));

    // Simulate a user dragging the slider mid-playback: the driver
    // resynchronizes and continues from the dragged frame
    dims.set_point(TIME_AXIS, 5.0)?;
    std::thread::sleep(Duration::from_secs(1));

    // Bounce between the boundaries instead of wrapping
    controller.play(
        TIME_AXIS,
        PlayOpts {
            loop_mode: Some(LoopMode::BackAndForth),
            ..Default::default()
        },
    )?;
    std::thread::sleep(Duration::from_secs(2));

    controller.stop_all();
    info!(frame = dims.point(TIME_AXIS)?, "demo finished");
    Ok(())
}
