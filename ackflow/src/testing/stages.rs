//! Stages with controllable behaviour.

use crate::message::Message;
use crate::stages::{Stage, StageOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Rejects every message while its flag is set and passes them through
/// otherwise. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct DropSwitch {
    dropping: Arc<AtomicBool>,
}

impl DropSwitch {
    /// Creates a switch that passes messages through.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether messages are rejected.
    pub fn set_drop(&self, dropping: bool) {
        self.dropping.store(dropping, Ordering::SeqCst);
    }

    /// Returns true while messages are rejected.
    pub fn is_dropping(&self) -> bool {
        self.dropping.load(Ordering::SeqCst)
    }
}

impl Stage for DropSwitch {
    fn name(&self) -> &str {
        "drop_switch"
    }

    fn process(&mut self, message: Message) -> StageOutcome {
        if self.is_dropping() {
            StageOutcome::reject("message dropped")
        } else {
            StageOutcome::pass(message)
        }
    }
}

/// Replaces every message with `count` single part messages reading
/// `test0`, `test1` and so on.
#[derive(Debug, Clone)]
pub struct FanOut {
    count: usize,
}

impl FanOut {
    /// Creates a fan-out of `count` messages.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

impl Stage for FanOut {
    fn name(&self) -> &str {
        "fan_out"
    }

    fn process(&mut self, _message: Message) -> StageOutcome {
        StageOutcome::Messages(
            (0..self.count)
                .map(|i| Message::new([format!("test{i}")]))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResponseError;

    #[test]
    fn test_drop_switch_shares_flag() {
        let switch = DropSwitch::new();
        let mut stage = switch.clone();

        assert_eq!(
            stage.process(Message::new(["foo"])),
            StageOutcome::pass(Message::new(["foo"]))
        );

        switch.set_drop(true);
        assert_eq!(
            stage.process(Message::new(["foo"])),
            StageOutcome::Rejected(ResponseError::rejected("message dropped"))
        );
    }

    #[test]
    fn test_fan_out() {
        let mut stage = FanOut::new(3);
        let StageOutcome::Messages(messages) = stage.process(Message::new(["foo"])) else {
            panic!("expected messages");
        };
        assert_eq!(
            messages,
            vec![
                Message::new(["test0"]),
                Message::new(["test1"]),
                Message::new(["test2"]),
            ]
        );
    }
}
