//! Animation driver: the ticking process that advances one axis.

use crate::settings::{
    resolve_points, validate_frame_range, AxisSettings, LoopMode, SettingsEvent,
    SettingsSubscriber,
};
use crate::PlaybackError;
use ndv_core::{AxisRange, Dims, DimsSubscriber, SubscriberId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Invoked exactly once when a driver stops, from whichever path got
/// there first (explicit stop, fps 0, or once-mode exhaustion).
pub(crate) type StoppedHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Outcome of a single advance step.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Advance {
    Continue(f64),
    Finished,
}

/// Mutable ticking state owned by one driver.
///
/// `step` only carries the direction; the magnitude of each advance is
/// the axis step size. `max_point` is exclusive, one past the inclusive
/// frame-range maximum, so both boundary checks compare uniformly.
#[derive(Debug, Clone)]
struct DriverState {
    current: f64,
    step: f64,
    interval: Duration,
    loop_mode: LoopMode,
    min_point: f64,
    max_point: f64,
    dims_step: f64,
}

impl DriverState {
    fn apply_fps(&mut self, fps: f64) {
        self.step = if fps > 0.0 { 1.0 } else { -1.0 };
        self.interval = Duration::from_secs_f64(1.0 / fps.abs());
    }

    fn apply_bounds(&mut self, frame_range: Option<(f64, f64)>, dims_range: AxisRange) {
        let (min_point, max_point) = resolve_points(frame_range, dims_range);
        self.min_point = min_point;
        self.max_point = max_point;
        self.dims_step = dims_range.step;
    }

    /// Advance one frame, applying the boundary policy of the current
    /// loop mode. The policy is total: below the window, past it, or
    /// inside it are the only cases.
    fn advance(&mut self) -> Advance {
        self.current += self.step * self.dims_step;
        if self.current < self.min_point {
            match self.loop_mode {
                LoopMode::BackAndForth => {
                    self.step = -self.step;
                    self.current = self.min_point + self.step * self.dims_step;
                }
                LoopMode::Loop => {
                    self.current = self.max_point + self.current - self.min_point;
                }
                LoopMode::Once => return Advance::Finished,
            }
        } else if self.current >= self.max_point {
            match self.loop_mode {
                LoopMode::BackAndForth => {
                    self.step = -self.step;
                    self.current = self.max_point + 2.0 * self.step * self.dims_step;
                }
                LoopMode::Loop => {
                    self.current = self.min_point + self.current - self.max_point;
                }
                LoopMode::Once => return Advance::Finished,
            }
        }
        Advance::Continue(self.current)
    }

    /// In once mode, hitting play while already at (or within one step
    /// of) the terminal boundary should restart from the opposite one
    /// instead of stopping immediately. Returns the position to jump
    /// to before the first scheduled tick.
    fn replay_jump(&self) -> Option<f64> {
        if self.loop_mode != LoopMode::Once {
            return None;
        }
        if self.step > 0.0 && self.current >= self.max_point - self.dims_step {
            Some(self.min_point)
        } else if self.step < 0.0 && self.current <= self.min_point + self.dims_step {
            Some(self.max_point - self.dims_step)
        } else {
            None
        }
    }
}

/// State shared between the tick task and the subscription hooks.
struct DriverShared {
    state: Mutex<DriverState>,
    stopped: AtomicBool,
}

/// Keeps the driver's frame in sync with out-of-band dims writes and
/// follows range changes on its axis.
struct DimsHook {
    axis: usize,
    shared: Arc<DriverShared>,
    settings: Arc<AxisSettings>,
    dims: Arc<Dims>,
}

impl DimsSubscriber for DimsHook {
    fn on_point_changed(&self, axis: usize, value: f64) {
        if axis == self.axis {
            // External edit wins over the driver's own tracking
            self.shared.state.lock().current = value;
        }
    }

    fn on_range_changed(&self, axis: usize) {
        if axis != self.axis {
            return;
        }
        if let Ok(dims_range) = self.dims.range(self.axis) {
            self.shared
                .state
                .lock()
                .apply_bounds(self.settings.frame_range(), dims_range);
        }
    }
}

/// Applies settings changes to a running driver.
struct SettingsHook {
    axis: usize,
    shared: Arc<DriverShared>,
    dims: Arc<Dims>,
    stopped_hook: StoppedHook,
}

impl SettingsSubscriber for SettingsHook {
    fn on_settings_changed(&self, event: &SettingsEvent) {
        match *event {
            SettingsEvent::FpsChanged(fps) => {
                if fps == 0.0 {
                    if !self.shared.stopped.swap(true, Ordering::SeqCst) {
                        tracing::debug!(axis = self.axis, "animation stopped by fps 0");
                        (self.stopped_hook)(self.axis);
                    }
                } else {
                    self.shared.state.lock().apply_fps(fps);
                }
            }
            SettingsEvent::LoopModeChanged(mode) => {
                self.shared.state.lock().loop_mode = mode;
            }
            SettingsEvent::FrameRangeChanged(range) => {
                // Already validated by the setter that published it
                if let Ok(dims_range) = self.dims.range(self.axis) {
                    self.shared.state.lock().apply_bounds(range, dims_range);
                }
            }
        }
    }
}

/// Handle to a running animation driver.
///
/// Cheap to clone; stopping through any clone stops the shared tick
/// task. A driver whose once mode reached its bound stops on its own
/// and the handle merely reports it.
#[derive(Clone)]
pub struct AnimationDriver {
    axis: usize,
    inner: Arc<DriverInner>,
}

struct DriverInner {
    shared: Arc<DriverShared>,
    task: JoinHandle<()>,
    dims: Arc<Dims>,
    dims_sub_id: SubscriberId,
    stopped_hook: StoppedHook,
}

impl AnimationDriver {
    /// Build the driver from the axis's current settings and start its
    /// tick task on `runtime`. The caller resolves fps 0 to a stop
    /// before getting here.
    pub(crate) fn start(
        dims: Arc<Dims>,
        settings: Arc<AxisSettings>,
        axis: usize,
        runtime: &Handle,
        stopped_hook: StoppedHook,
    ) -> Result<Self, PlaybackError> {
        let snapshot = settings.snapshot();
        if snapshot.fps == 0.0 {
            return Err(PlaybackError::InvalidFps(0.0));
        }
        let dims_range = dims.range(axis)?;
        // The stored window may predate a range change; re-check before
        // ticking against it.
        validate_frame_range(snapshot.frame_range, dims_range)?;
        let (min_point, max_point) = resolve_points(snapshot.frame_range, dims_range);

        let current = dims.point(axis)?.max(min_point).min(max_point);
        let mut state = DriverState {
            current,
            step: 1.0,
            interval: Duration::ZERO,
            loop_mode: snapshot.loop_mode,
            min_point,
            max_point,
            dims_step: dims_range.step,
        };
        state.apply_fps(snapshot.fps);

        let shared = Arc::new(DriverShared {
            state: Mutex::new(state),
            stopped: AtomicBool::new(false),
        });

        let dims_hook = Arc::new(DimsHook {
            axis,
            shared: shared.clone(),
            settings: settings.clone(),
            dims: dims.clone(),
        });
        let dims_sub_id = dims.subscribe(dims_hook.clone());

        let settings_hook = Arc::new(SettingsHook {
            axis,
            shared: shared.clone(),
            dims: dims.clone(),
            stopped_hook: stopped_hook.clone(),
        });
        settings.subscribe(settings_hook.clone());

        tracing::debug!(
            axis,
            fps = snapshot.fps,
            mode = %snapshot.loop_mode,
            min_point,
            max_point,
            "animation started"
        );

        let task = runtime.spawn(drive(
            axis,
            dims.clone(),
            shared.clone(),
            dims_sub_id,
            stopped_hook.clone(),
            dims_hook,
            settings_hook,
        ));

        Ok(Self {
            axis,
            inner: Arc::new(DriverInner {
                shared,
                task,
                dims,
                dims_sub_id,
                stopped_hook,
            }),
        })
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.shared.stopped.load(Ordering::SeqCst)
    }

    /// Stop the driver. Idempotent. The tick task is cancelled at its
    /// pending sleep; a tick already past its flag check may finish one
    /// last write, never more.
    pub fn stop(&self) {
        if !self.inner.shared.stopped.swap(true, Ordering::SeqCst) {
            self.inner.task.abort();
            self.inner.dims.unsubscribe(self.inner.dims_sub_id);
            tracing::debug!(axis = self.axis, "animation stopped");
            (self.inner.stopped_hook)(self.axis);
        }
    }
}

impl Drop for DriverInner {
    fn drop(&mut self) {
        // Last handle gone: nobody can stop the loop anymore
        self.task.abort();
    }
}

/// Self-rescheduling tick loop.
///
/// The interval is re-read every cycle so an fps change takes effect on
/// the next tick, and the stop flag is checked before every dims write.
async fn drive(
    axis: usize,
    dims: Arc<Dims>,
    shared: Arc<DriverShared>,
    dims_sub_id: SubscriberId,
    stopped_hook: StoppedHook,
    dims_hook: Arc<DimsHook>,
    settings_hook: Arc<SettingsHook>,
) {
    // Subscriptions live exactly as long as the drive loop
    let _hooks = (dims_hook, settings_hook);

    // Once mode waits for its first scheduled tick (after an optional
    // replay jump back to the opposite boundary); the looping modes
    // advance immediately.
    let starting_once = { shared.state.lock().loop_mode == LoopMode::Once };
    if starting_once {
        let jump = {
            let mut state = shared.state.lock();
            let jump = state.replay_jump();
            if let Some(position) = jump {
                state.current = position;
            }
            jump
        };
        if let Some(position) = jump {
            emit(&dims, axis, dims_sub_id, position);
        }
        let interval = { shared.state.lock().interval };
        tokio::time::sleep(interval).await;
    }

    let finished = loop {
        if shared.stopped.load(Ordering::SeqCst) {
            break false;
        }
        let advanced = { shared.state.lock().advance() };
        match advanced {
            Advance::Continue(position) => emit(&dims, axis, dims_sub_id, position),
            Advance::Finished => break true,
        }
        let interval = { shared.state.lock().interval };
        tokio::time::sleep(interval).await;
    };

    dims.unsubscribe(dims_sub_id);
    if finished && !shared.stopped.swap(true, Ordering::SeqCst) {
        tracing::debug!(axis, "animation finished");
        stopped_hook(axis);
    }
}

/// Write the animated position with the driver's own dims subscription
/// suppressed, so the echoed notification does not re-enter the step
/// logic.
fn emit(dims: &Dims, axis: usize, sub_id: SubscriberId, position: f64) {
    let _blocker = dims.block(sub_id);
    if let Err(error) = dims.set_point(axis, position) {
        tracing::warn!(axis, %error, "dims rejected animated point");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(current: f64, fps: f64, loop_mode: LoopMode, min: f64, max: f64) -> DriverState {
        let mut state = DriverState {
            current,
            step: 1.0,
            interval: Duration::ZERO,
            loop_mode,
            min_point: min,
            max_point: max,
            dims_step: 1.0,
        };
        state.apply_fps(fps);
        state
    }

    fn positions(state: &mut DriverState, n: usize) -> Vec<f64> {
        (0..n)
            .map(|_| match state.advance() {
                Advance::Continue(position) => position,
                Advance::Finished => panic!("finished early"),
            })
            .collect()
    }

    #[test]
    fn test_loop_wraps_with_fixed_period() {
        let mut state = state(0.0, 10.0, LoopMode::Loop, 0.0, 10.0);
        let seen = positions(&mut state, 30);

        assert!(seen.iter().all(|p| (0.0..10.0).contains(p)));
        // Period equals the window width
        for i in 0..20 {
            assert_eq!(seen[i], seen[i + 10]);
        }
        assert_eq!(&seen[..11], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 0.0, 1.0]);
    }

    #[test]
    fn test_loop_wrap_carries_overshoot() {
        let mut state = state(9.0, 10.0, LoopMode::Loop, 0.0, 10.0);
        state.dims_step = 2.0;
        // 9 + 2 = 11, one past the window wraps to one past its start
        assert_eq!(state.advance(), Advance::Continue(1.0));
    }

    #[test]
    fn test_back_and_forth_reflects_at_boundaries() {
        let mut state = state(3.0, 10.0, LoopMode::BackAndForth, 0.0, 5.0);
        let seen = positions(&mut state, 12);

        assert!(seen.iter().all(|p| (0.0..5.0).contains(p)));
        // Up to the top, bounce one step back, down to the bottom, bounce
        assert_eq!(
            seen,
            vec![4.0, 3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0]
        );
    }

    #[test]
    fn test_back_and_forth_reverses_direction_in_state() {
        let mut state = state(4.0, 10.0, LoopMode::BackAndForth, 0.0, 5.0);
        assert_eq!(state.step, 1.0);
        state.advance();
        assert_eq!(state.step, -1.0);
    }

    #[test]
    fn test_once_finishes_past_upper_bound() {
        let mut state = state(8.0, 10.0, LoopMode::Once, 0.0, 10.0);
        assert_eq!(state.advance(), Advance::Continue(9.0));
        assert_eq!(state.advance(), Advance::Finished);
    }

    #[test]
    fn test_once_finishes_past_lower_bound_in_reverse() {
        let mut state = state(1.0, -10.0, LoopMode::Once, 0.0, 10.0);
        assert_eq!(state.advance(), Advance::Continue(0.0));
        assert_eq!(state.advance(), Advance::Finished);
    }

    #[test]
    fn test_replay_jump_only_near_terminal_boundary() {
        let state_mid = state(5.0, 10.0, LoopMode::Once, 0.0, 10.0);
        assert_eq!(state_mid.replay_jump(), None);

        let state_end = state(9.0, 10.0, LoopMode::Once, 0.0, 10.0);
        assert_eq!(state_end.replay_jump(), Some(0.0));

        let state_start = state(0.0, -10.0, LoopMode::Once, 0.0, 10.0);
        assert_eq!(state_start.replay_jump(), Some(9.0));

        // Looping modes never jump
        let state_loop = state(9.0, 10.0, LoopMode::Loop, 0.0, 10.0);
        assert_eq!(state_loop.replay_jump(), None);
    }

    #[test]
    fn test_apply_fps_sets_direction_and_interval() {
        let mut state = state(0.0, 10.0, LoopMode::Loop, 0.0, 10.0);
        state.apply_fps(-20.0);
        assert_eq!(state.step, -1.0);
        assert_eq!(state.interval, Duration::from_millis(50));
    }

    #[test]
    fn test_mode_change_keeps_current_position() {
        let mut state = state(0.0, 10.0, LoopMode::Loop, 0.0, 5.0);
        positions(&mut state, 4);
        assert_eq!(state.current, 4.0);

        // Switching the mode mid-flight leaves the position alone; the
        // next boundary crossing is handled under the new policy.
        state.loop_mode = LoopMode::Once;
        assert_eq!(state.current, 4.0);
        assert_eq!(state.advance(), Advance::Finished);
    }

    #[test]
    fn test_frame_range_change_applies_on_next_tick() {
        let mut state = state(8.0, 10.0, LoopMode::Loop, 0.0, 10.0);
        state.apply_bounds(Some((2.0, 5.0)), AxisRange::new(0.0, 10.0, 1.0));

        // Out of the new window: 8 steps to 9, wraps by the overshoot
        // past the exclusive bound 6 back into [2, 6)
        assert_eq!(state.advance(), Advance::Continue(5.0));
        assert!((state.min_point..state.max_point).contains(&state.current));
    }
}
