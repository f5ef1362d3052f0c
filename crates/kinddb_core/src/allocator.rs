//! Integer id allocation.

use crate::error::{CoreError, CoreResult};
use crate::key::Key;
use std::collections::HashMap;

/// Hands out integer ids per `(parent, kind)` scope.
///
/// Ids start at 1 and are never handed out twice. Ids chosen explicitly by
/// the application are reported with [`IdAllocator::observe`] so the
/// allocator skips past them.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: HashMap<Scope, i64>,
}

/// Allocation scope: the parent key (if any) and the kind.
pub type Scope = (Option<Key>, String);

impl IdAllocator {
    /// Creates an allocator with every scope starting at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id that would be handed out in `scope`.
    fn peek(&self, scope: &Scope) -> i64 {
        self.next.get(scope).copied().unwrap_or(1)
    }

    /// Reserves `size` consecutive ids, returning `(first, last)`.
    pub fn allocate(&mut self, scope: Scope, size: u64) -> CoreResult<(i64, i64)> {
        if size == 0 {
            return Err(CoreError::bad_argument("allocation size must be positive"));
        }
        let size = i64::try_from(size)
            .map_err(|_| CoreError::bad_argument("allocation size too large"))?;
        let first = self.peek(&scope);
        let last = first
            .checked_add(size - 1)
            .filter(|last| *last < i64::MAX)
            .ok_or_else(|| CoreError::bad_argument("id space exhausted"))?;
        self.next.insert(scope, last + 1);
        Ok((first, last))
    }

    /// Reserves every id up to and including `max`, returning
    /// `(first, last)`. When `max` is already behind the counter the range
    /// is empty and `last == first - 1`.
    pub fn allocate_max(&mut self, scope: Scope, max: i64) -> CoreResult<(i64, i64)> {
        if max <= 0 || max == i64::MAX {
            return Err(CoreError::bad_argument(format!(
                "allocation max must be in 1..{}, got {max}",
                i64::MAX
            )));
        }
        let first = self.peek(&scope);
        if max < first {
            return Ok((first, first - 1));
        }
        self.next.insert(scope, max + 1);
        Ok((first, max))
    }

    /// Records that `id` is in use so it is never allocated.
    pub fn observe(&mut self, scope: Scope, id: i64) {
        let next = self.next.entry(scope).or_insert(1);
        if id >= *next && id < i64::MAX {
            *next = id + 1;
        }
    }

    /// Restores a scope's counter from the journal.
    pub(crate) fn restore(&mut self, scope: Scope, next: i64) {
        let current = self.next.entry(scope).or_insert(1);
        *current = (*current).max(next);
    }
}
