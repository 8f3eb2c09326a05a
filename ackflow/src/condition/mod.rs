//! Conditions used to branch stage behaviour.

mod count;

pub use count::CountCondition;

use crate::message::Message;
use std::fmt::Debug;

/// A predicate evaluated against a message.
///
/// Conditions may keep state between checks, so they are checked through a
/// mutable reference and owned by exactly one stage.
#[cfg_attr(test, mockall::automock)]
pub trait Condition: Send + Debug {
    /// Returns true if the message satisfies the condition.
    fn check(&mut self, message: &Message) -> bool;
}

/// A condition with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticCondition(pub bool);

impl Condition for StaticCondition {
    fn check(&mut self, _message: &Message) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_condition() {
        assert!(StaticCondition(true).check(&Message::empty()));
        assert!(!StaticCondition(false).check(&Message::empty()));
    }

    #[test]
    fn test_mock_condition() {
        let mut cond = MockCondition::new();
        cond.expect_check().times(2).returning(|msg| !msg.is_empty());

        assert!(cond.check(&Message::new(["x"])));
        assert!(!cond.check(&Message::empty()));
    }
}
