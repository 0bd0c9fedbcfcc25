//! Circular dependency detection infrastructure.
//!
//! Every top-level resolution owns one [`InFlight`] stack, carried inside its
//! resolution context. Nothing is thread-local: concurrent call trees never
//! see each other's frames.

use smallvec::SmallVec;

use crate::error::{DiError, DiResult};
use crate::key::Key;

/// Keys currently being constructed within one call tree, in call order.
#[derive(Debug, Default, Clone)]
pub(crate) struct InFlight {
    stack: SmallVec<[Key; 8]>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pushes `key`, failing if it is already in flight or the stack is too deep.
    ///
    /// The reported cycle starts at the first occurrence of `key` and ends
    /// with `key` again, e.g. `[A, B, C, A]`.
    pub(crate) fn enter(&mut self, key: Key, max_depth: usize) -> DiResult<()> {
        if let Some(pos) = self.stack.iter().position(|k| *k == key) {
            let mut cycle: Vec<Key> = self.stack[pos..].to_vec();
            cycle.push(key);
            return Err(DiError::circular(cycle));
        }
        if self.stack.len() >= max_depth {
            return Err(DiError::depth_exceeded(self.stack.len()));
        }
        self.stack.push(key);
        Ok(())
    }

    /// Pops `key`. Frames are strictly nested, so it is always the top.
    pub(crate) fn leave(&mut self, key: Key) {
        let popped = self.stack.pop();
        debug_assert_eq!(popped, Some(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key_of_type;

    struct A;
    struct B;
    struct C;

    #[test]
    fn cycle_is_reported_from_first_occurrence() {
        let (a, b, c) = (key_of_type::<A>(), key_of_type::<B>(), key_of_type::<C>());
        let mut stack = InFlight::new();
        stack.enter(a, 16).unwrap();
        stack.enter(b, 16).unwrap();
        stack.enter(c, 16).unwrap();

        let err = stack.enter(b, 16).unwrap_err();
        assert_eq!(err.cycle(), Some(&[b, c, b][..]));
        assert_eq!(stack.stack.len(), 3);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut stack = InFlight::new();
        stack.enter(key_of_type::<A>(), 1).unwrap();
        let err = stack.enter(key_of_type::<B>(), 1).unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::DepthExceeded { depth: 1 }));
    }

    #[test]
    fn leave_restores_previous_state() {
        let a = key_of_type::<A>();
        let mut stack = InFlight::new();
        stack.enter(a, 4).unwrap();
        stack.leave(a);
        assert!(stack.stack.is_empty());
        assert!(stack.enter(a, 4).is_ok());
    }
}
