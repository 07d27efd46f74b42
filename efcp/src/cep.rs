//! CEP-id allocation (§3.1, §4.1): a monotonic pool with explicit release.
//!
//! `0` is reserved as [`CepId::INVALID`] (see `addr`), so the pool starts
//! counting from `1`. A released id is not handed out again until the
//! connection that held it has actually finished tearing down — the
//! container only calls [`CepIdPool::release`] after
//! [`crate::EfcpContainer::destroy_connection`]'s drain completes, never
//! eagerly on table removal.
use std::collections::HashSet;

use dtsv::{CepId, Error, Result};

/// Monotonic id pool with a free-list for ids released after teardown.
#[derive(Default)]
pub(crate) struct CepIdPool {
    next: u64,
    free: Vec<u64>,
    in_use: HashSet<u64>,
}

impl CepIdPool {
    /// Creates an empty pool. The first allocated id is `1`.
    pub(crate) fn new() -> Self {
        Self {
            next: 1,
            free: Vec::new(),
            in_use: HashSet::new(),
        }
    }

    /// Allocates the next free id, preferring a released one over growing
    /// the monotonic counter. Fails with `ResourceExhausted` only if the
    /// 64-bit counter itself has been exhausted, which in practice never
    /// happens.
    pub(crate) fn allocate(&mut self) -> Result<CepId> {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next = self.next.checked_add(1).ok_or(Error::ResourceExhausted)?;
                id
            }
        };
        self.in_use.insert(id);
        Ok(CepId(id))
    }

    /// Returns `id` to the free pool. A no-op if `id` was not currently
    /// allocated (defends against a double `release`).
    pub(crate) fn release(&mut self, id: CepId) {
        if self.in_use.remove(&id.0) {
            self.free.push(id.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut pool = CepIdPool::new();
        assert_eq!(pool.allocate().unwrap(), CepId(1));
        assert_eq!(pool.allocate().unwrap(), CepId(2));
    }

    #[test]
    fn released_ids_are_reused_before_growing() {
        let mut pool = CepIdPool::new();
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        pool.release(a);
        assert_eq!(pool.allocate().unwrap(), a);
        assert_eq!(pool.allocate().unwrap(), CepId(3));
    }

    #[test]
    fn releasing_an_id_not_in_use_is_a_no_op() {
        let mut pool = CepIdPool::new();
        pool.release(CepId(99));
        assert_eq!(pool.allocate().unwrap(), CepId(1));
    }
}
