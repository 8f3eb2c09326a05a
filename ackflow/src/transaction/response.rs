//! Response type and the single-use response path.

use crate::errors::{PipelineError, PipelineResult, ResponseError};
use std::time::Duration;
use tokio::sync::oneshot;

/// The outcome delivered to satisfy a transaction's obligation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    error: Option<ResponseError>,
}

impl Response {
    /// Creates a successful response.
    #[must_use]
    pub fn ack() -> Self {
        Self { error: None }
    }

    /// Creates a failed response.
    #[must_use]
    pub fn error(error: ResponseError) -> Self {
        Self { error: Some(error) }
    }

    /// Returns true if the response signals success.
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.error.is_none()
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn err(&self) -> Option<&ResponseError> {
        self.error.as_ref()
    }

    /// Converts into a standard result.
    pub fn into_result(self) -> Result<(), ResponseError> {
        match self.error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

impl From<Result<(), ResponseError>> for Response {
    fn from(result: Result<(), ResponseError>) -> Self {
        match result {
            Ok(()) => Self::ack(),
            Err(err) => Self::error(err),
        }
    }
}

/// The sending half of a transaction's response path.
///
/// Responding consumes the sender, so at most one response can ever be
/// delivered. Dropping it without responding abandons the transaction.
#[derive(Debug)]
pub struct ResponseSender {
    tx: oneshot::Sender<Response>,
}

impl ResponseSender {
    /// Delivers the response.
    ///
    /// Returns false if the waiting party has already gone away.
    pub fn respond(self, response: Response) -> bool {
        self.tx.send(response).is_ok()
    }

    /// Returns true if the waiting party has dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The receiving half of a transaction's response path.
#[derive(Debug)]
pub struct ResponseReceiver {
    rx: oneshot::Receiver<Response>,
}

impl ResponseReceiver {
    /// Waits for the response.
    ///
    /// Fails with [`PipelineError::Abandoned`] if the sender was dropped
    /// without responding.
    pub async fn recv(self) -> PipelineResult<Response> {
        self.rx.await.map_err(|_| PipelineError::Abandoned)
    }

    /// Waits for the response for at most `timeout`.
    pub async fn recv_timeout(self, timeout: Duration) -> PipelineResult<Response> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout),
        }
    }

    /// Returns the response if it has already arrived.
    ///
    /// Yields `Ok(None)` while the response is still pending.
    pub fn try_recv(&mut self) -> PipelineResult<Option<Response>> {
        match self.rx.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(PipelineError::Abandoned),
        }
    }
}

/// Creates a connected response path.
#[must_use]
pub fn response_channel() -> (ResponseSender, ResponseReceiver) {
    let (tx, rx) = oneshot::channel();
    (ResponseSender { tx }, ResponseReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_response_delivered_once() {
        let (tx, rx) = response_channel();
        assert!(tx.respond(Response::ack()));
        let res = rx.recv().await.unwrap();
        assert!(res.is_ack());
    }

    #[tokio::test]
    async fn test_dropped_sender_is_abandoned() {
        let (tx, rx) = response_channel();
        drop(tx);
        assert_eq!(rx.recv().await, Err(PipelineError::Abandoned));
    }

    #[tokio::test]
    async fn test_recv_timeout() {
        let (_tx, rx) = response_channel();
        let result = rx.recv_timeout(Duration::from_millis(10)).await;
        assert_eq!(result, Err(PipelineError::Timeout));
    }

    #[test]
    fn test_respond_to_dropped_receiver() {
        let (tx, rx) = response_channel();
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.respond(Response::ack()));
    }

    #[test]
    fn test_try_recv() {
        let (tx, mut rx) = response_channel();
        assert_eq!(rx.try_recv(), Ok(None));
        tx.respond(Response::error(ResponseError::rejected("no")));
        let res = rx.try_recv().unwrap().unwrap();
        assert_eq!(res.err(), Some(&ResponseError::rejected("no")));
    }

    #[test]
    fn test_response_into_result() {
        assert!(Response::ack().into_result().is_ok());
        let err = Response::error(ResponseError::Abandoned).into_result();
        assert_eq!(err, Err(ResponseError::Abandoned));
        assert!(Response::from(Ok::<(), ResponseError>(())).is_ack());
    }
}
