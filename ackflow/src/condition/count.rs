//! Count-based condition.

use super::Condition;
use crate::message::Message;

/// Holds for `arg - 1` consecutive checks, fails the `arg`-th, then restarts.
///
/// Useful as a gate that lets through all but every `arg`-th message.
#[derive(Debug, Clone)]
pub struct CountCondition {
    arg: u64,
    counter: u64,
}

impl CountCondition {
    /// Creates a count condition cycling every `arg` checks.
    #[must_use]
    pub fn new(arg: u64) -> Self {
        Self { arg, counter: 0 }
    }

    /// Returns the number of checks in the current cycle.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl Condition for CountCondition {
    fn check(&mut self, _message: &Message) -> bool {
        self.counter += 1;
        if self.counter < self.arg {
            return true;
        }
        self.counter = 0;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_cycles() {
        let mut cond = CountCondition::new(10);
        let msg = Message::empty();

        for _ in 0..10 {
            for _ in 0..9 {
                assert!(cond.check(&msg), "expected true during count");
            }
            assert!(!cond.check(&msg), "expected false at end of count");
            assert_eq!(cond.counter(), 0);
        }
    }

    #[test]
    fn test_count_of_one_always_fails() {
        let mut cond = CountCondition::new(1);
        assert!(!cond.check(&Message::empty()));
        assert!(!cond.check(&Message::empty()));
    }
}
