use ndarray::{Array, ArrayView, Axis, Dimension, Slice};

/// Truncate or zero-pad `array` along `axis` so that it has exactly `target` entries there.
///
/// Trailing entries beyond `target` are dropped; missing entries are appended as
/// `A::default()` (zero for the float types used in this crate).
pub fn fix_length<A, D>(array: ArrayView<'_, A, D>, target: usize, axis: Axis) -> Array<A, D>
where
    A: Clone + Default,
    D: Dimension,
{
    let current = array.len_of(axis);
    if current >= target {
        return array.slice_axis(axis, Slice::from(..target)).to_owned();
    }
    let mut shape = array.raw_dim();
    shape[axis.index()] = target;
    let mut padded = Array::from_elem(shape, A::default());
    padded
        .slice_axis_mut(axis, Slice::from(..current))
        .assign(&array);
    padded
}
