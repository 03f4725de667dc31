//! Dims model implementation

use super::{AxisRange, DimsSubscriber};
use crate::DimsError;
use ahash::AHashSet;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Identity of a registered subscriber, used for targeted suppression.
pub type SubscriberId = Uuid;

/// Per-axis state stored internally
#[derive(Debug, Clone)]
struct AxisState {
    range: AxisRange,
    point: f64,
    label: String,
}

/// The shared dims model.
///
/// Holds the current point, range and label of every axis, and notifies
/// registered subscribers synchronously on each change. All writes go
/// through this type; a writer that would otherwise hear its own echo
/// suppresses itself with [`Dims::block`] for the duration of the write.
pub struct Dims {
    axes: RwLock<Vec<AxisState>>,
    subscribers: RwLock<Vec<(SubscriberId, Weak<dyn DimsSubscriber>)>>,
    blocked: Mutex<AHashSet<SubscriberId>>,
}

impl Dims {
    /// Create a model from explicit axis ranges.
    pub fn new(ranges: Vec<AxisRange>) -> Result<Self, DimsError> {
        for (axis, range) in ranges.iter().enumerate() {
            if !range.is_valid() {
                return Err(DimsError::InvalidRange {
                    axis,
                    start: range.start,
                    stop: range.stop,
                    step: range.step,
                });
            }
        }
        let axes = ranges
            .into_iter()
            .enumerate()
            .map(|(axis, range)| AxisState {
                point: range.start,
                range,
                label: axis.to_string(),
            })
            .collect();
        Ok(Self {
            axes: RwLock::new(axes),
            subscribers: RwLock::new(Vec::new()),
            blocked: Mutex::new(AHashSet::new()),
        })
    }

    /// Create a model for data of the given shape, one unit-spaced axis
    /// per dimension.
    pub fn from_shape(shape: &[usize]) -> Self {
        let axes = shape
            .iter()
            .enumerate()
            .map(|(axis, &len)| AxisState {
                range: AxisRange::from_len(len),
                point: 0.0,
                label: axis.to_string(),
            })
            .collect();
        Self {
            axes: RwLock::new(axes),
            subscribers: RwLock::new(Vec::new()),
            blocked: Mutex::new(AHashSet::new()),
        }
    }

    /// Number of dimensions in the model.
    pub fn ndim(&self) -> usize {
        self.axes.read().len()
    }

    /// Current point along `axis`.
    pub fn point(&self, axis: usize) -> Result<f64, DimsError> {
        let axes = self.axes.read();
        Ok(self.axis_state(&axes, axis)?.point)
    }

    /// Range of `axis`.
    pub fn range(&self, axis: usize) -> Result<AxisRange, DimsError> {
        let axes = self.axes.read();
        Ok(self.axis_state(&axes, axis)?.range)
    }

    /// Index of the last valid slice along `axis`.
    pub fn max_index(&self, axis: usize) -> Result<usize, DimsError> {
        Ok(self.range(axis)?.max_index())
    }

    /// Label of `axis`.
    pub fn axis_label(&self, axis: usize) -> Result<String, DimsError> {
        let axes = self.axes.read();
        Ok(self.axis_state(&axes, axis)?.label.clone())
    }

    /// Set the current point along `axis`.
    ///
    /// The value is snapped to the axis step grid and clamped to the
    /// valid slider window; the applied value is returned. Subscribers
    /// are notified only when the stored point actually moved.
    pub fn set_point(&self, axis: usize, value: f64) -> Result<f64, DimsError> {
        let applied = {
            let mut axes = self.axes.write();
            let state = self.axis_state_mut(&mut axes, axis)?;
            let applied = state.range.clamp_point(value);
            if applied == state.point {
                return Ok(applied);
            }
            state.point = applied;
            applied
        };
        tracing::trace!(axis, value = applied, "point changed");
        self.notify(|subscriber| subscriber.on_point_changed(axis, applied));
        Ok(applied)
    }

    /// Replace the range of `axis`, re-clamping its current point.
    pub fn set_range(&self, axis: usize, range: AxisRange) -> Result<(), DimsError> {
        if !range.is_valid() {
            return Err(DimsError::InvalidRange {
                axis,
                start: range.start,
                stop: range.stop,
                step: range.step,
            });
        }
        let moved = {
            let mut axes = self.axes.write();
            let state = self.axis_state_mut(&mut axes, axis)?;
            state.range = range;
            let reclamped = range.clamp_point(state.point);
            let moved = (reclamped != state.point).then_some(reclamped);
            state.point = reclamped;
            moved
        };
        tracing::debug!(
            axis,
            start = range.start,
            stop = range.stop,
            step = range.step,
            "range changed"
        );
        self.notify(|subscriber| subscriber.on_range_changed(axis));
        if let Some(value) = moved {
            self.notify(|subscriber| subscriber.on_point_changed(axis, value));
        }
        Ok(())
    }

    /// Rename `axis`.
    pub fn set_axis_label(
        &self,
        axis: usize,
        label: impl Into<String>,
    ) -> Result<(), DimsError> {
        let label = label.into();
        {
            let mut axes = self.axes.write();
            let state = self.axis_state_mut(&mut axes, axis)?;
            if state.label == label {
                return Ok(());
            }
            state.label = label.clone();
        }
        tracing::debug!(axis, label = %label, "axis label changed");
        self.notify(|subscriber| subscriber.on_axis_label_changed(axis, &label));
        Ok(())
    }

    /// Register a subscriber. Registration is weak: dropping the
    /// subscriber's `Arc` is teardown, dead entries are pruned on the
    /// next notification.
    pub fn subscribe(&self, subscriber: Arc<dyn DimsSubscriber>) -> SubscriberId {
        let id = Uuid::new_v4();
        let mut subscribers = self.subscribers.write();
        subscribers.push((id, Arc::downgrade(&subscriber)));
        id
    }

    /// Remove a subscriber explicitly.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|(existing, _)| *existing != id);
    }

    /// Suppress notifications to one subscriber for the lifetime of the
    /// returned guard.
    pub fn block(&self, id: SubscriberId) -> BlockerGuard<'_> {
        self.blocked.lock().insert(id);
        BlockerGuard { dims: self, id }
    }

    fn axis_state<'a>(
        &self,
        axes: &'a [AxisState],
        axis: usize,
    ) -> Result<&'a AxisState, DimsError> {
        axes.get(axis).ok_or(DimsError::InvalidAxis {
            axis,
            ndim: axes.len(),
        })
    }

    fn axis_state_mut<'a>(
        &self,
        axes: &'a mut Vec<AxisState>,
        axis: usize,
    ) -> Result<&'a mut AxisState, DimsError> {
        let ndim = axes.len();
        axes.get_mut(axis)
            .ok_or(DimsError::InvalidAxis { axis, ndim })
    }

    /// Notify all live, unblocked subscribers.
    fn notify(&self, callback: impl Fn(&dyn DimsSubscriber)) {
        let blocked = self.blocked.lock().clone();
        let mut subscribers = self.subscribers.write();

        // Remove any dead weak references
        subscribers.retain(|(_, weak)| weak.strong_count() > 0);

        for (id, weak) in subscribers.iter() {
            if blocked.contains(id) {
                continue;
            }
            if let Some(subscriber) = weak.upgrade() {
                callback(subscriber.as_ref());
            }
        }
    }
}

/// RAII guard suppressing notifications to a single subscriber.
///
/// The suppression is released when the guard drops, on every exit
/// path, so the listener misses exactly the writes performed while the
/// guard is alive.
#[must_use = "notifications are only suppressed while the guard is alive"]
pub struct BlockerGuard<'a> {
    dims: &'a Dims,
    id: SubscriberId,
}

impl Drop for BlockerGuard<'_> {
    fn drop(&mut self) {
        self.dims.blocked.lock().remove(&self.id);
    }
}
