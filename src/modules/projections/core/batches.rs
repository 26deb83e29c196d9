/// A contiguous slice of the pending transactions, projected in one storage
/// transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    items: Vec<T>,
    is_last: bool,
}

impl<T> Batch<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True for the final batch of a `handle` call.
    pub fn is_last(&self) -> bool {
        self.is_last
    }
}

/// Splits `items` into order-preserving batches of at most `size` items.
pub fn in_batches_of<T>(items: Vec<T>, size: usize) -> Vec<Batch<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut remaining = items.into_iter().peekable();
    while remaining.peek().is_some() {
        let items: Vec<T> = remaining.by_ref().take(size).collect();
        let is_last = remaining.peek().is_none();
        batches.push(Batch { items, is_last });
    }
    batches
}
