//! Mock sources and sinks.

use crate::errors::{PipelineError, PipelineResult};
use crate::message::Message;
use crate::pipeline::lifecycle::{DoneGuard, Lifecycle};
use crate::ports::{Sink, Source};
use crate::transaction::{
    transaction_channel, Response, ResponseReceiver, Transaction, TransactionReceiver,
    TransactionSender,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A source backed by a channel that tests write into.
#[derive(Debug)]
pub struct MockSource {
    sender: Mutex<Option<TransactionSender>>,
    output: Mutex<Option<TransactionReceiver>>,
    lifecycle: Arc<Lifecycle>,
}

impl MockSource {
    /// Creates a source whose stream buffers up to `capacity` transactions.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = transaction_channel(capacity);
        Self {
            sender: Mutex::new(Some(tx)),
            output: Mutex::new(Some(rx)),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Returns a handle for writing transactions, or `None` once closed.
    pub fn sender(&self) -> Option<TransactionSender> {
        self.sender.lock().clone()
    }

    /// Sends a message and returns the receiver its response arrives on.
    pub async fn send(&self, message: Message) -> PipelineResult<ResponseReceiver> {
        let sender = self.sender().ok_or(PipelineError::Closed)?;
        let (tran, rx) = Transaction::new(message);
        sender.send(tran).await.map_err(|_| PipelineError::Closed)?;
        Ok(rx)
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl Source for MockSource {
    fn transaction_chan(&self) -> Option<TransactionReceiver> {
        self.output.lock().take()
    }

    fn connected(&self) -> bool {
        true
    }

    fn close_async(&self) {
        if self.lifecycle.request_stop() {
            // Senders handed out earlier keep the stream open until dropped.
            self.sender.lock().take();
            self.lifecycle.mark_done();
        }
    }

    async fn wait_for_close(&self, timeout: Duration) -> PipelineResult<()> {
        self.lifecycle.wait_done(timeout).await
    }
}

/// A sink that only stores the stream it is bound to.
#[derive(Debug, Default)]
pub struct MockSink {
    input: Mutex<Option<TransactionReceiver>>,
    bound: Mutex<bool>,
}

impl MockSink {
    /// Creates an unbound sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the bound stream for reading by hand.
    pub fn take_input(&self) -> Option<TransactionReceiver> {
        self.input.lock().take()
    }
}

#[async_trait]
impl Sink for MockSink {
    fn consume(&self, input: TransactionReceiver) -> PipelineResult<()> {
        let mut bound = self.bound.lock();
        if *bound {
            return Err(PipelineError::AlreadyConsuming);
        }
        *bound = true;
        *self.input.lock() = Some(input);
        Ok(())
    }

    fn connected(&self) -> bool {
        true
    }

    fn close_async(&self) {}

    async fn wait_for_close(&self, _timeout: Duration) -> PipelineResult<()> {
        Ok(())
    }
}

/// A sink that answers every transaction with a fixed response and records
/// what it received.
#[derive(Debug)]
pub struct AckingSink {
    response: Response,
    received: Arc<Mutex<Vec<Message>>>,
    bound: Mutex<bool>,
    lifecycle: Arc<Lifecycle>,
}

impl AckingSink {
    /// Creates a sink that acks everything.
    #[must_use]
    pub fn new() -> Self {
        Self::with_response(Response::ack())
    }

    /// Creates a sink that answers everything with `response`.
    #[must_use]
    pub fn with_response(response: Response) -> Self {
        Self {
            response,
            received: Arc::new(Mutex::new(Vec::new())),
            bound: Mutex::new(false),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Returns the messages received so far, in arrival order.
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().clone()
    }

    /// Returns the number of messages received so far.
    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }
}

impl Default for AckingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for AckingSink {
    fn consume(&self, mut input: TransactionReceiver) -> PipelineResult<()> {
        let mut bound = self.bound.lock();
        if *bound {
            return Err(PipelineError::AlreadyConsuming);
        }
        if self.lifecycle.stop_requested() {
            return Err(PipelineError::Closed);
        }
        *bound = true;

        let response = self.response.clone();
        let received = self.received.clone();
        let mut stop = self.lifecycle.stop_signal();
        let guard = DoneGuard(self.lifecycle.clone());
        tokio::spawn(async move {
            let _guard = guard;
            let mut closing = false;
            loop {
                let next = tokio::select! {
                    biased;
                    () = stop.stopped(), if !closing => {
                        input.close();
                        closing = true;
                        continue;
                    }
                    next = input.recv() => next,
                };
                let Some(tran) = next else { break };
                received.lock().push(tran.payload.clone());
                tran.respond(response.clone());
            }
            debug!("Acking sink stopped");
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        true
    }

    fn close_async(&self) {
        self.lifecycle.request_stop();
        if !*self.bound.lock() {
            self.lifecycle.mark_done();
        }
    }

    async fn wait_for_close(&self, timeout: Duration) -> PipelineResult<()> {
        self.lifecycle.wait_done(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResponseError;
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_mock_source_close() {
        let source = MockSource::new(1);
        let mut stream = source.transaction_chan().unwrap();
        assert!(source.transaction_chan().is_none());
        assert!(source.connected());

        let res = source.send(Message::new(["foo"])).await.unwrap();
        stream.recv().await.unwrap().ack();
        assert!(res.recv().await.unwrap().is_ack());

        assert_eq!(
            source.wait_for_close(Duration::from_millis(10)).await,
            Err(PipelineError::Timeout)
        );
        source.close_async();
        source.close_async();
        source.wait_for_close(TIMEOUT).await.unwrap();
        assert!(stream.recv().await.is_none());
        assert!(matches!(
            source.send(Message::empty()).await,
            Err(PipelineError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_mock_sink_binds_once() {
        let sink = MockSink::new();
        let (tx, rx) = transaction_channel(1);
        sink.consume(rx).unwrap();

        let (_tx2, rx2) = transaction_channel(1);
        assert_eq!(sink.consume(rx2), Err(PipelineError::AlreadyConsuming));

        let mut input = sink.take_input().unwrap();
        let (tran, res) = Transaction::new(Message::new(["foo"]));
        tx.send(tran).await.unwrap();
        input.recv().await.unwrap().ack();
        assert!(res.recv().await.unwrap().is_ack());
        sink.wait_for_close(TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_acking_sink_answers_and_records() {
        let sink = AckingSink::with_response(Response::error(ResponseError::delivery("full")));
        let (tx, rx) = transaction_channel(1);
        sink.consume(rx).unwrap();

        for payload in ["a", "b"] {
            let (tran, res) = Transaction::new(Message::new([payload]));
            tx.send(tran).await.unwrap();
            assert_eq!(
                res.recv().await.unwrap().err(),
                Some(&ResponseError::delivery("full"))
            );
        }
        assert_eq!(sink.received_count(), 2);
        assert_eq!(sink.received()[1], Message::new(["b"]));

        drop(tx);
        sink.wait_for_close(TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_acking_sink_close_drains_queue() {
        let sink = AckingSink::new();
        let (tx, rx) = transaction_channel(4);
        let mut responses = Vec::new();
        for _ in 0..3 {
            let (tran, res) = Transaction::new(Message::empty());
            tx.send(tran).await.unwrap();
            responses.push(res);
        }

        sink.consume(rx).unwrap();
        sink.close_async();
        sink.wait_for_close(TIMEOUT).await.unwrap();

        for res in responses {
            assert!(res.recv().await.unwrap().is_ack());
        }
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_acking_sink_close_before_consume() {
        let sink = AckingSink::new();
        sink.close_async();
        sink.wait_for_close(TIMEOUT).await.unwrap();

        let (_tx, rx) = transaction_channel(1);
        assert_eq!(sink.consume(rx), Err(PipelineError::Closed));
    }
}
