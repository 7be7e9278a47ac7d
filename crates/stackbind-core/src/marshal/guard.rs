use std::ops::{Deref, DerefMut};

use crate::vm::State;

/// Restores the stack top on drop unless committed.
///
/// Useful for multi-step marshalling that bails out early with `?`.
pub struct StackGuard<'a> {
    state: &'a mut State,
    top: i32,
    committed: bool,
}

impl<'a> StackGuard<'a> {
    /// Remember the current top of `state`.
    pub fn new(state: &'a mut State) -> Self {
        let top = state.top();
        Self {
            state,
            top,
            committed: false,
        }
    }

    /// Keep whatever the guarded code left on the stack.
    pub fn commit(mut self) {
        self.committed = true;
    }

    /// The top recorded when the guard was created.
    pub fn saved_top(&self) -> i32 {
        self.top
    }
}

impl Deref for StackGuard<'_> {
    type Target = State;

    fn deref(&self) -> &State {
        self.state
    }
}

impl DerefMut for StackGuard<'_> {
    fn deref_mut(&mut self) -> &mut State {
        self.state
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.state.set_top(self.top);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_on_drop() {
        let mut state = State::new();
        state.push(1);
        {
            let mut guard = state.guard();
            guard.push((2, 3));
            assert_eq!(guard.top(), 3);
        }
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn commit_keeps_values() {
        let mut state = State::new();
        let mut guard = state.guard();
        guard.push("kept");
        guard.commit();
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn restores_after_early_return() {
        fn fill(state: &mut State) -> Option<()> {
            let mut guard = state.guard();
            guard.push(1);
            guard.to_value::<bool>(-1)?;
            guard.commit();
            Some(())
        }

        let mut state = State::new();
        assert!(fill(&mut state).is_none());
        assert_eq!(state.top(), 0);
    }
}
