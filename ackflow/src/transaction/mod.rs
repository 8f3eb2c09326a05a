//! The transaction/response protocol shared by every component.
//!
//! A producer sends a [`Transaction`] into an input channel and then waits on
//! the matching [`ResponseReceiver`]. The holder of the transaction must
//! eventually deliver exactly one [`Response`] through the
//! [`ResponseSender`]. Dropping the sender without responding is a protocol
//! violation which the waiting party observes as
//! [`PipelineError::Abandoned`](crate::errors::PipelineError::Abandoned).

mod response;

pub use response::{response_channel, Response, ResponseReceiver, ResponseSender};

use crate::errors::ResponseError;
use crate::message::Message;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sending side of a transaction stream.
pub type TransactionSender = mpsc::Sender<Transaction>;

/// Receiving side of a transaction stream.
pub type TransactionReceiver = mpsc::Receiver<Transaction>;

/// Creates a bounded transaction stream.
#[must_use]
pub fn transaction_channel(capacity: usize) -> (TransactionSender, TransactionReceiver) {
    mpsc::channel(capacity.max(1))
}

/// A message paired with its single-use response obligation.
#[derive(Debug)]
pub struct Transaction {
    id: Uuid,
    /// The message being delivered.
    pub payload: Message,
    /// Where the outcome for this message must be sent.
    pub response: ResponseSender,
}

impl Transaction {
    /// Creates a transaction and the receiver its outcome will arrive on.
    #[must_use]
    pub fn new(payload: Message) -> (Self, ResponseReceiver) {
        let (response, rx) = response_channel();
        (Self::with_sender(payload, response), rx)
    }

    /// Creates a transaction around an existing response path.
    #[must_use]
    pub fn with_sender(payload: Message, response: ResponseSender) -> Self {
        Self {
            id: Uuid::now_v7(),
            payload,
            response,
        }
    }

    /// Returns the transaction id used for log correlation.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Resolves the transaction with a response.
    pub fn respond(self, response: Response) -> bool {
        self.response.respond(response)
    }

    /// Resolves the transaction successfully.
    pub fn ack(self) -> bool {
        self.respond(Response::ack())
    }

    /// Resolves the transaction with a failure.
    pub fn nack(self, error: ResponseError) -> bool {
        self.respond(Response::error(error))
    }

    /// Splits the transaction into its message and response path.
    #[must_use]
    pub fn into_parts(self) -> (Message, ResponseSender) {
        (self.payload, self.response)
    }
}
