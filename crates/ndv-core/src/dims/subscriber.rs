//! Dims subscriber trait

/// Trait for components that need to respond to dims changes.
///
/// All callbacks default to no-ops so implementors only override the
/// notifications they care about. Callbacks are invoked synchronously
/// from the thread performing the write and must not block.
pub trait DimsSubscriber: Send + Sync {
    /// Called after the current point of an axis changed.
    fn on_point_changed(&self, _axis: usize, _value: f64) {}

    /// Called after the range of an axis changed.
    fn on_range_changed(&self, _axis: usize) {}

    /// Called after the label of an axis changed.
    fn on_axis_label_changed(&self, _axis: usize, _label: &str) {}
}
