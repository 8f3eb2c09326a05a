//! Stage trait and implementations.
//!
//! Stages are the opaque transforms a lane runs each message through. A
//! stage is synchronous and single threaded: it is owned by exactly one lane
//! and sees one message at a time.

mod outcome;

pub use outcome::{ChainOutcome, StageOutcome};

use crate::condition::Condition;
use crate::message::Message;
use std::fmt::Debug;
use tracing::trace;

/// Trait for pipeline stages.
pub trait Stage: Send + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Processes one message.
    ///
    /// Returns the messages to pass on (possibly none) or a rejection that
    /// is reported back to the message's sender.
    fn process(&mut self, message: Message) -> StageOutcome;
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn process(&mut self, message: Message) -> StageOutcome {
        (**self).process(message)
    }
}

/// Runs a message through a chain of stages.
///
/// Each stage is applied to every message produced by the previous one. A
/// rejection drops only the branch that raised it; the first rejection seen
/// is kept so that a fully dropped input can be answered with it.
pub fn execute_all<S: Stage>(stages: &mut [S], message: Message) -> ChainOutcome {
    let mut current = vec![message];
    let mut rejection = None;

    for stage in stages.iter_mut() {
        let mut next = Vec::with_capacity(current.len());
        for msg in current {
            match stage.process(msg) {
                StageOutcome::Messages(out) => next.extend(out),
                StageOutcome::Rejected(err) => {
                    trace!(stage = %stage.name(), error = %err, "Message rejected by stage");
                    rejection.get_or_insert(err);
                }
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }

    ChainOutcome {
        messages: current,
        rejection,
    }
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: FnMut(Message) -> StageOutcome + Send,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: FnMut(Message) -> StageOutcome + Send,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: FnMut(Message) -> StageOutcome + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

impl<F> Stage for FnStage<F>
where
    F: FnMut(Message) -> StageOutcome + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, message: Message) -> StageOutcome {
        (self.func)(message)
    }
}

/// A stage that passes every message through unchanged.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for NoOpStage {
    fn default() -> Self {
        Self::new("noop")
    }
}

impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, message: Message) -> StageOutcome {
        StageOutcome::pass(message)
    }
}

/// A stage that rejects every message failing its condition.
#[derive(Debug)]
pub struct GateStage<C: Condition> {
    name: String,
    condition: C,
}

impl<C: Condition> GateStage<C> {
    /// Creates a gate around a condition.
    pub fn new(name: impl Into<String>, condition: C) -> Self {
        Self {
            name: name.into(),
            condition,
        }
    }
}

impl<C: Condition> Stage for GateStage<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, message: Message) -> StageOutcome {
        if self.condition.check(&message) {
            StageOutcome::pass(message)
        } else {
            StageOutcome::reject(format!("condition of stage '{}' not met", self.name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{CountCondition, MockCondition};
    use crate::errors::ResponseError;
    use pretty_assertions::assert_eq;

    fn splitter(n: usize) -> FnStage<impl FnMut(Message) -> StageOutcome + Send> {
        FnStage::new("split", move |msg: Message| {
            StageOutcome::Messages(
                (0..n)
                    .map(|i| {
                        let mut out = msg.clone();
                        out.push(format!("{i}").as_str());
                        out
                    })
                    .collect(),
            )
        })
    }

    #[test]
    fn test_noop_stage() {
        let mut stage = NoOpStage::default();
        assert_eq!(stage.name(), "noop");
        let out = stage.process(Message::new(["a"]));
        assert_eq!(out, StageOutcome::pass(Message::new(["a"])));
    }

    #[test]
    fn test_execute_all_chains_stages() {
        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(splitter(2)), Box::new(splitter(3))];
        let outcome = execute_all(&mut stages, Message::empty());

        assert_eq!(outcome.messages.len(), 6);
        assert!(outcome.rejection.is_none());
        assert_eq!(outcome.messages[0].all_bytes(), vec![b"0".as_slice(), b"0".as_slice()]);
    }

    #[test]
    fn test_execute_all_rejection_drops_input() {
        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(FnStage::new("reject", |_msg: Message| StageOutcome::reject("nope"))),
            Box::new(NoOpStage::default()),
        ];
        let outcome = execute_all(&mut stages, Message::empty());

        assert!(outcome.is_dropped());
        assert_eq!(outcome.rejection, Some(ResponseError::rejected("nope")));
    }

    #[test]
    fn test_execute_all_partial_rejection_keeps_survivors() {
        let mut seen = 0;
        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(splitter(2)),
            Box::new(FnStage::new("odd", move |msg: Message| {
                seen += 1;
                if seen % 2 == 0 {
                    StageOutcome::reject("even")
                } else {
                    StageOutcome::pass(msg)
                }
            })),
        ];
        let outcome = execute_all(&mut stages, Message::empty());

        assert_eq!(outcome.messages.len(), 1);
        assert!(!outcome.is_dropped());
        assert_eq!(outcome.rejection, Some(ResponseError::rejected("even")));
    }

    #[test]
    fn test_execute_all_reduced_to_nothing() {
        let mut stages = vec![FnStage::new("sink", |_msg: Message| StageOutcome::none())];
        let outcome = execute_all(&mut stages, Message::new(["x"]));

        assert!(outcome.messages.is_empty());
        assert!(!outcome.is_dropped());
    }

    #[test]
    fn test_gate_stage_with_count() {
        let mut gate = GateStage::new("every_third", CountCondition::new(3));

        assert!(!gate.process(Message::empty()).is_rejected());
        assert!(!gate.process(Message::empty()).is_rejected());
        let third = gate.process(Message::empty());
        assert!(matches!(third, StageOutcome::Rejected(ResponseError::Rejected(_))));
    }

    #[test]
    fn test_gate_stage_consults_condition() {
        let mut cond = MockCondition::new();
        cond.expect_check()
            .times(1)
            .returning(|msg| msg.get(0).is_some_and(|p| p.get() == b"allow"));

        let mut gate = GateStage::new("mocked", cond);
        let out = gate.process(Message::new(["allow"]));
        assert_eq!(out, StageOutcome::pass(Message::new(["allow"])));
    }
}
