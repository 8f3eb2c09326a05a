//! Single-lane pipeline running a stage chain.

use super::lifecycle::{DoneGuard, Lifecycle, StopSignal};
use super::Pipeline;
use crate::errors::{PipelineError, PipelineResult, ResponseError};
use crate::message::Message;
use crate::metrics::{Counter, Metrics, Timer, TimerGuard};
use crate::stages::{execute_all, ChainOutcome, Stage};
use crate::transaction::{
    transaction_channel, Response, Transaction, TransactionReceiver, TransactionSender,
};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

struct ProcessorMetrics {
    received: Counter,
    dropped: Counter,
    sent: Counter,
    failed: Counter,
    latency: Timer,
}

impl ProcessorMetrics {
    fn new(metrics: &dyn Metrics, lane: &str) -> Self {
        let labels = ["lane"];
        let values = [lane];
        Self {
            received: metrics
                .counter_vec("pipeline.processor.received", &labels)
                .with(&values),
            dropped: metrics
                .counter_vec("pipeline.processor.dropped", &labels)
                .with(&values),
            sent: metrics
                .counter_vec("pipeline.processor.sent", &labels)
                .with(&values),
            failed: metrics
                .counter_vec("pipeline.processor.failed", &labels)
                .with(&values),
            latency: metrics
                .timer_vec("pipeline.processor.latency", &labels)
                .with(&values),
        }
    }
}

/// Everything the worker loop owns once it is started.
struct Worker {
    lane: String,
    stages: Option<Vec<Box<dyn Stage>>>,
    output: TransactionSender,
    metrics: ProcessorMetrics,
}

enum State {
    Idle(Worker),
    Running,
    Closed,
}

/// A pipeline that runs every transaction through a chain of stages on a
/// single worker.
///
/// Transactions are handled strictly one at a time in arrival order. Results
/// are emitted as fresh transactions on [`Pipeline::transaction_chan`] and
/// their responses are reduced into the response of the original
/// transaction: success if every result succeeded, otherwise the first
/// failure to arrive.
pub struct Processor {
    lane: String,
    state: Mutex<State>,
    output: Mutex<Option<TransactionReceiver>>,
    lifecycle: Arc<Lifecycle>,
}

impl Processor {
    /// Creates a processor over a stage chain.
    pub fn new(stages: Vec<Box<dyn Stage>>, metrics: Arc<dyn Metrics>) -> Self {
        Self::for_lane(0, stages, metrics)
    }

    /// Creates a processor identified by a lane index in logs and metrics.
    pub fn for_lane(lane: usize, stages: Vec<Box<dyn Stage>>, metrics: Arc<dyn Metrics>) -> Self {
        let lane = lane.to_string();
        let (tx, rx) = transaction_channel(1);
        let worker = Worker {
            metrics: ProcessorMetrics::new(metrics.as_ref(), &lane),
            lane: lane.clone(),
            stages: Some(stages),
            output: tx,
        };
        Self {
            lane,
            state: Mutex::new(State::Idle(worker)),
            output: Mutex::new(Some(rx)),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Sets the capacity of the output stream.
    #[must_use]
    pub fn with_output_buffer(mut self, capacity: usize) -> Self {
        let (tx, rx) = transaction_channel(capacity);
        if let State::Idle(worker) = self.state.get_mut() {
            worker.output = tx;
            *self.output.get_mut() = Some(rx);
        }
        self
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("lane", &self.lane)
            .field("done", &self.lifecycle.is_done())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Pipeline for Processor {
    fn consume(&self, input: TransactionReceiver) -> PipelineResult<()> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, State::Running) {
            State::Idle(worker) => {
                let stop = self.lifecycle.stop_signal();
                let guard = DoneGuard(self.lifecycle.clone());
                tokio::spawn(async move {
                    let _guard = guard;
                    worker.run(input, stop).await;
                });
                Ok(())
            }
            State::Running => Err(PipelineError::AlreadyConsuming),
            State::Closed => {
                *state = State::Closed;
                Err(PipelineError::Closed)
            }
        }
    }

    fn transaction_chan(&self) -> Option<TransactionReceiver> {
        self.output.lock().take()
    }

    fn close_async(&self) {
        if !self.lifecycle.request_stop() {
            return;
        }
        let mut state = self.state.lock();
        if matches!(*state, State::Idle(_)) {
            // Never started, so dropping the worker closes the output.
            *state = State::Closed;
            self.lifecycle.mark_done();
        }
    }

    async fn wait_for_close(&self, timeout: Duration) -> PipelineResult<()> {
        self.lifecycle.wait_done(timeout).await
    }
}

impl Worker {
    async fn run(mut self, mut input: TransactionReceiver, mut stop: StopSignal) {
        debug!(lane = %self.lane, "Processor started");
        let mut closing = false;
        loop {
            let next = tokio::select! {
                biased;
                () = stop.stopped(), if !closing => {
                    // Stop accepting and drain what is already queued.
                    input.close();
                    closing = true;
                    continue;
                }
                next = input.recv() => next,
            };
            match next {
                Some(tran) => self.handle(tran).await,
                None => break,
            }
        }
        debug!(lane = %self.lane, "Processor stopped");
    }

    async fn handle(&mut self, tran: Transaction) {
        let id = tran.id();
        self.metrics.received.incr(1);
        let (payload, response) = tran.into_parts();

        let ChainOutcome { messages, rejection } = self.run_stages(payload).await;
        // Partial rejections are ignored as long as something survived.
        if messages.is_empty() {
            if let Some(rejection) = rejection {
                self.metrics.dropped.incr(1);
                debug!(lane = %self.lane, transaction_id = %id, error = %rejection, "Message rejected");
                response.respond(Response::error(rejection));
            } else {
                debug!(lane = %self.lane, transaction_id = %id, "Message reduced to nothing");
                response.respond(Response::ack());
            }
            return;
        }

        let result = self.dispatch(id, messages).await;
        if let Some(err) = result.err() {
            self.metrics.failed.incr(1);
            debug!(lane = %self.lane, transaction_id = %id, error = %err, "Results failed");
        }
        if !response.respond(result) {
            warn!(lane = %self.lane, transaction_id = %id, "Original sender stopped waiting");
        }
    }

    /// Runs the chain off the async workers, handing it back afterwards.
    async fn run_stages(&mut self, message: Message) -> ChainOutcome {
        let Some(mut stages) = self.stages.take() else {
            return ChainOutcome {
                messages: Vec::new(),
                rejection: Some(ResponseError::stage("stage chain unavailable")),
            };
        };

        let timer = TimerGuard::start(self.metrics.latency.clone());
        let joined = tokio::task::spawn_blocking(move || {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| execute_all(&mut stages, message)));
            (stages, outcome)
        })
        .await;
        timer.stop();

        match joined {
            Ok((stages, Ok(outcome))) => {
                self.stages = Some(stages);
                outcome
            }
            Ok((stages, Err(panic))) => {
                self.stages = Some(stages);
                error!(lane = %self.lane, "Stage panicked: {:?}", panic);
                ChainOutcome {
                    messages: Vec::new(),
                    rejection: Some(ResponseError::stage("stage panicked")),
                }
            }
            Err(e) => {
                error!(lane = %self.lane, error = %e, "Stage chain lost");
                ChainOutcome {
                    messages: Vec::new(),
                    rejection: Some(ResponseError::stage(e.to_string())),
                }
            }
        }
    }

    /// Emits one transaction per result and reduces their responses.
    async fn dispatch(&mut self, id: uuid::Uuid, messages: Vec<Message>) -> Response {
        let count = messages.len();
        debug!(lane = %self.lane, transaction_id = %id, outputs = count, "Emitting results");
        let mut pending = FuturesUnordered::new();
        for message in messages {
            let (tran, rx) = Transaction::new(message);
            if self.output.send(tran).await.is_err() {
                // The result is dropped, so its receiver reports it abandoned.
                warn!(lane = %self.lane, transaction_id = %id, "Output closed, abandoning result");
            }
            pending.push(rx.recv());
        }
        self.metrics.sent.incr(i64::try_from(count).unwrap_or(i64::MAX));

        let mut first_error = None;
        while let Some(result) = pending.next().await {
            let response = result.unwrap_or_else(|_| Response::error(ResponseError::Abandoned));
            if let Some(err) = response.err() {
                if first_error.is_none() {
                    first_error = Some(err.clone());
                }
            }
        }
        first_error.map_or_else(Response::ack, Response::error)
    }
}
