//! Per-axis playback controller

use crate::driver::{AnimationDriver, StoppedHook};
use crate::settings::{AxisSettings, LoopMode};
use crate::PlaybackError;
use ahash::AHashMap;
use ndv_core::Dims;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;

/// Optional overrides merged into an axis's stored settings by
/// [`PlaybackController::play`]; `None` fields leave the stored value
/// untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayOpts {
    pub fps: Option<f64>,
    pub loop_mode: Option<LoopMode>,
    pub frame_range: Option<(f64, f64)>,
}

/// Trait for components that need to respond to playback starting or
/// stopping on an axis.
pub trait PlaybackSubscriber: Send + Sync {
    fn on_play_started(&self, _axis: usize) {}
    fn on_play_stopped(&self, _axis: usize) {}
}

/// Playback front end over the dims model.
///
/// Remembers each axis's settings across play/stop cycles and enforces
/// the single-driver-per-axis rule: starting playback on an axis
/// replaces any driver already running there, while drivers on other
/// axes run independently. Drivers tick on the runtime whose handle is
/// passed at construction, keeping frame pacing off the interactive
/// thread.
pub struct PlaybackController {
    dims: Arc<Dims>,
    runtime: Handle,
    settings: RwLock<AHashMap<usize, Arc<AxisSettings>>>,
    drivers: Mutex<AHashMap<usize, AnimationDriver>>,
    subscribers: Arc<RwLock<Vec<Weak<dyn PlaybackSubscriber>>>>,
}

impl PlaybackController {
    pub fn new(dims: Arc<Dims>, runtime: Handle) -> Self {
        Self {
            dims,
            runtime,
            settings: RwLock::new(AHashMap::new()),
            drivers: Mutex::new(AHashMap::new()),
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Settings for `axis`, created on first use and kept for the
    /// lifetime of the controller.
    pub fn settings(&self, axis: usize) -> Arc<AxisSettings> {
        self.settings.write().entry(axis).or_default().clone()
    }

    /// Animate `axis`.
    ///
    /// Any provided override is merged into the axis's stored settings
    /// first (and validated there). If the resulting fps is exactly 0
    /// this is a no-op stop and returns `Ok(None)`; otherwise any
    /// driver already animating the axis is stopped and a new one is
    /// started from the merged settings.
    pub fn play(
        &self,
        axis: usize,
        opts: PlayOpts,
    ) -> Result<Option<AnimationDriver>, PlaybackError> {
        let dims_range = self.dims.range(axis)?;
        let settings = self.settings(axis);
        if let Some(fps) = opts.fps {
            settings.set_fps(fps)?;
        }
        if let Some(mode) = opts.loop_mode {
            settings.set_loop_mode(mode);
        }
        if let Some(range) = opts.frame_range {
            settings.set_frame_range(Some(range), dims_range)?;
        }

        // The merged settings decide: fps 0 is a stop request
        if settings.fps() == 0.0 {
            self.stop(axis);
            return Ok(None);
        }

        // Replace, never stack
        self.stop(axis);

        let driver = AnimationDriver::start(
            self.dims.clone(),
            settings,
            axis,
            &self.runtime,
            self.stopped_hook(),
        )?;
        self.drivers.lock().insert(axis, driver.clone());
        self.notify(|subscriber| subscriber.on_play_started(axis));
        Ok(Some(driver))
    }

    /// Stop playback on `axis`. Idempotent.
    pub fn stop(&self, axis: usize) {
        let driver = self.drivers.lock().remove(&axis);
        if let Some(driver) = driver {
            driver.stop();
        }
    }

    /// Stop every running driver.
    pub fn stop_all(&self) {
        let drivers: Vec<_> = self.drivers.lock().drain().collect();
        for (_, driver) in drivers {
            driver.stop();
        }
    }

    /// Whether a driver is currently animating `axis`.
    pub fn is_playing(&self, axis: usize) -> bool {
        self.drivers
            .lock()
            .get(&axis)
            .map(|driver| !driver.is_stopped())
            .unwrap_or(false)
    }

    /// Register a subscriber for play started/stopped notifications.
    /// Registration is weak; dropping the subscriber's `Arc` is
    /// teardown.
    pub fn subscribe(&self, subscriber: Arc<dyn PlaybackSubscriber>) {
        self.subscribers.write().push(Arc::downgrade(&subscriber));
    }

    fn stopped_hook(&self) -> StoppedHook {
        let subscribers = Arc::clone(&self.subscribers);
        Arc::new(move |axis| {
            notify_all(&subscribers, |subscriber| subscriber.on_play_stopped(axis));
        })
    }

    fn notify(&self, callback: impl Fn(&dyn PlaybackSubscriber)) {
        notify_all(&self.subscribers, callback);
    }
}

fn notify_all(
    subscribers: &RwLock<Vec<Weak<dyn PlaybackSubscriber>>>,
    callback: impl Fn(&dyn PlaybackSubscriber),
) {
    let mut subscribers = subscribers.write();
    subscribers.retain(|weak| weak.strong_count() > 0);
    for weak in subscribers.iter() {
        if let Some(subscriber) = weak.upgrade() {
            callback(subscriber.as_ref());
        }
    }
}
