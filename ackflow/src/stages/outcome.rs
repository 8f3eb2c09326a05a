//! Stage and chain outcome types.

use crate::errors::ResponseError;
use crate::message::Message;

/// What a single stage did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Zero, one or many messages to pass on.
    Messages(Vec<Message>),
    /// The message was vetoed; the error is reported back to its sender.
    Rejected(ResponseError),
}

impl StageOutcome {
    /// Passes a single message on.
    #[must_use]
    pub fn pass(message: Message) -> Self {
        Self::Messages(vec![message])
    }

    /// Reduces the message to nothing. This is not an error.
    #[must_use]
    pub fn none() -> Self {
        Self::Messages(Vec::new())
    }

    /// Rejects the message with a reason.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Rejected(ResponseError::rejected(reason))
    }

    /// Rejects the message because the stage failed.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Rejected(ResponseError::stage(reason))
    }

    /// Returns true if the message was rejected.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

impl From<Vec<Message>> for StageOutcome {
    fn from(messages: Vec<Message>) -> Self {
        Self::Messages(messages)
    }
}

/// What a whole stage chain did with one input message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Messages that made it through every stage.
    pub messages: Vec<Message>,
    /// The first rejection raised by any branch, if any.
    pub rejection: Option<ResponseError>,
}

impl ChainOutcome {
    /// Returns true if every branch was rejected and nothing survived.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.messages.is_empty() && self.rejection.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_outcome_constructors() {
        assert_eq!(StageOutcome::none(), StageOutcome::Messages(vec![]));
        assert!(StageOutcome::reject("nope").is_rejected());
        assert_eq!(
            StageOutcome::fail("boom"),
            StageOutcome::Rejected(ResponseError::stage("boom"))
        );
        assert!(!StageOutcome::pass(Message::empty()).is_rejected());
    }

    #[test]
    fn test_chain_outcome_dropped() {
        let empty = ChainOutcome::default();
        assert!(!empty.is_dropped());

        let dropped = ChainOutcome {
            messages: vec![],
            rejection: Some(ResponseError::rejected("gate")),
        };
        assert!(dropped.is_dropped());

        let partial = ChainOutcome {
            messages: vec![Message::empty()],
            rejection: Some(ResponseError::rejected("gate")),
        };
        assert!(!partial.is_dropped());
    }
}
