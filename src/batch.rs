//! Splits pending work into batches for the classifier.

/// Partitions `items` into consecutive batches of `size`, preserving order. Every item lands in
/// exactly one batch, every batch but the last is full, and an empty input yields no batches. A
/// `size` of zero is treated as one.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(|c| c.to_vec()).collect()
}
