//! Identifier batching around the dialect's expression limit.

/// Splits id sets into batches that fit one `IN (...)` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierBatcher {
    batch_size: Option<usize>,
}

impl IdentifierBatcher {
    /// Create a batcher for a dialect allowing `max_expressions` expressions per
    /// statement. One expression is reserved for the key column, so batches hold
    /// `max_expressions - 1` ids; `0` means unbounded.
    pub fn new(max_expressions: usize) -> Self {
        let batch_size = match max_expressions {
            0 => None,
            m => Some(m.saturating_sub(1).max(1)),
        };
        Self { batch_size }
    }

    /// Create a batcher that never splits.
    pub fn unbounded() -> Self {
        Self { batch_size: None }
    }

    /// Maximum ids per batch, `None` if unbounded.
    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    /// Split `ids` into consecutive batches. Empty input yields no batches.
    pub fn split<'a>(&self, ids: &'a [i64]) -> Vec<&'a [i64]> {
        if ids.is_empty() {
            return Vec::new();
        }
        match self.batch_size {
            None => vec![ids],
            Some(size) => ids.chunks(size).collect(),
        }
    }

    /// Number of batches `split` produces for `n` ids.
    pub fn batch_count(&self, n: usize) -> usize {
        match (n, self.batch_size) {
            (0, _) => 0,
            (_, None) => 1,
            (n, Some(size)) => n.div_ceil(size),
        }
    }
}
