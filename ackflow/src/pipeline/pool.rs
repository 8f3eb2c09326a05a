//! Worker pool fanning a shared input out to parallel lanes.

use super::lifecycle::{DoneGuard, Lifecycle, StopSignal};
use super::{Pipeline, Processor};
use crate::config::PoolConfig;
use crate::errors::{PipelineError, PipelineResult, ResponseError};
use crate::metrics::{Counter, CounterVec, Gauge, Metrics};
use crate::stages::Stage;
use crate::transaction::{transaction_channel, Transaction, TransactionReceiver, TransactionSender};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Builds the pipeline for a lane index.
type LaneFactory = dyn Fn(usize) -> PipelineResult<Box<dyn Pipeline>> + Send + Sync;

#[derive(Clone)]
struct PoolMetrics {
    lanes: Gauge,
    dispatched: CounterVec,
    undeliverable: Counter,
}

impl PoolMetrics {
    fn new(metrics: &dyn Metrics) -> Self {
        Self {
            lanes: metrics.gauge("pipeline.pool.lanes"),
            dispatched: metrics.counter_vec("pipeline.pool.dispatched", &["lane"]),
            undeliverable: metrics.counter("pipeline.pool.undeliverable"),
        }
    }
}

struct Resize {
    size: usize,
    reply: oneshot::Sender<PipelineResult<()>>,
}

enum State {
    Idle {
        lanes: Vec<(usize, Box<dyn Pipeline>)>,
        output: TransactionSender,
        next_index: usize,
    },
    Running {
        control: mpsc::UnboundedSender<Resize>,
    },
    Closed,
}

/// A pipeline made of parallel lanes fed from one shared input.
///
/// Each inbound transaction goes to exactly one lane that has room for it.
/// When every lane is full the dispatcher, and with it the producer, waits.
/// Lane outputs are merged into the pool output as they arrive, so results of
/// different lanes interleave freely.
///
/// Closing the input drains the whole pool: queued work is dispatched,
/// every lane finishes its in-flight transactions, and only then does
/// [`Pipeline::wait_for_close`] succeed and the output stream end.
pub struct Pool {
    factory: Arc<LaneFactory>,
    lane_buffer: usize,
    state: Mutex<State>,
    output: Mutex<Option<TransactionReceiver>>,
    size: Arc<AtomicUsize>,
    lifecycle: Arc<Lifecycle>,
    metrics: PoolMetrics,
}

impl Pool {
    /// Creates a pool of `size` lanes, each built by `constructor` with its
    /// lane index.
    pub fn new<F, P>(constructor: F, size: usize, metrics: Arc<dyn Metrics>) -> PipelineResult<Self>
    where
        F: Fn(usize) -> PipelineResult<P> + Send + Sync + 'static,
        P: Pipeline + 'static,
    {
        Self::with_config(constructor, &PoolConfig::new().with_threads(size), metrics)
    }

    /// Creates a pool from configuration.
    pub fn with_config<F, P>(
        constructor: F,
        config: &PoolConfig,
        metrics: Arc<dyn Metrics>,
    ) -> PipelineResult<Self>
    where
        F: Fn(usize) -> PipelineResult<P> + Send + Sync + 'static,
        P: Pipeline + 'static,
    {
        if config.threads == 0 {
            return Err(PipelineError::InvalidSize(0));
        }

        let factory: Arc<LaneFactory> = Arc::new(move |index: usize| {
            constructor(index).map(|pipeline| Box::new(pipeline) as Box<dyn Pipeline>)
        });
        let lanes = (0..config.threads)
            .map(|index| factory(index).map(|pipeline| (index, pipeline)))
            .collect::<PipelineResult<Vec<_>>>()?;

        let (tx, rx) = transaction_channel(config.output_buffer);
        let pool = Self {
            factory,
            lane_buffer: config.lane_buffer,
            state: Mutex::new(State::Idle {
                lanes,
                output: tx,
                next_index: config.threads,
            }),
            output: Mutex::new(Some(rx)),
            size: Arc::new(AtomicUsize::new(0)),
            lifecycle: Lifecycle::new(),
            metrics: PoolMetrics::new(metrics.as_ref()),
        };
        pool.record_size(config.threads);
        Ok(pool)
    }

    /// Creates a pool whose lanes are processors over the stage chains
    /// returned by `stages` for each lane index.
    pub fn with_stages<F>(
        stages: F,
        config: &PoolConfig,
        metrics: Arc<dyn Metrics>,
    ) -> PipelineResult<Self>
    where
        F: Fn(usize) -> Vec<Box<dyn Stage>> + Send + Sync + 'static,
    {
        let output_buffer = config.output_buffer;
        let lane_metrics = metrics.clone();
        Self::with_config(
            move |index| {
                Ok(Processor::for_lane(index, stages(index), lane_metrics.clone())
                    .with_output_buffer(output_buffer))
            },
            config,
            metrics,
        )
    }

    /// Returns the current number of lanes.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Adds or removes lanes.
    ///
    /// New lanes are eligible for dispatch immediately. Removed lanes stop
    /// receiving work and finish what they already accepted in the
    /// background; the pool does not report closed until they have.
    pub async fn set_size(&self, size: usize) -> PipelineResult<()> {
        if size == 0 {
            return Err(PipelineError::InvalidSize(0));
        }

        let (reply, rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            match &mut *state {
                State::Idle {
                    lanes, next_index, ..
                } => return self.resize_idle(lanes, next_index, size),
                State::Running { control } => control
                    .send(Resize { size, reply })
                    .map_err(|_| PipelineError::Closed)?,
                State::Closed => return Err(PipelineError::Closed),
            }
        }
        rx.await.map_err(|_| PipelineError::Closed)?
    }

    fn resize_idle(
        &self,
        lanes: &mut Vec<(usize, Box<dyn Pipeline>)>,
        next_index: &mut usize,
        size: usize,
    ) -> PipelineResult<()> {
        while lanes.len() < size {
            let index = *next_index;
            let pipeline = (self.factory)(index)?;
            *next_index += 1;
            lanes.push((index, pipeline));
        }
        while lanes.len() > size {
            if let Some((_, pipeline)) = lanes.pop() {
                pipeline.close_async();
            }
        }
        self.record_size(lanes.len());
        Ok(())
    }

    fn record_size(&self, size: usize) {
        record_size(&self.size, &self.metrics, size);
    }
}

fn record_size(current: &AtomicUsize, metrics: &PoolMetrics, size: usize) {
    current.store(size, Ordering::SeqCst);
    metrics.lanes.set(i64::try_from(size).unwrap_or(i64::MAX));
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size())
            .field("lane_buffer", &self.lane_buffer)
            .field("done", &self.lifecycle.is_done())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Pipeline for Pool {
    fn consume(&self, input: TransactionReceiver) -> PipelineResult<()> {
        let mut state = self.state.lock();
        let (pending, output, next_index) = match std::mem::replace(&mut *state, State::Closed) {
            State::Idle {
                lanes,
                output,
                next_index,
            } => (lanes, output, next_index),
            running @ State::Running { .. } => {
                *state = running;
                return Err(PipelineError::AlreadyConsuming);
            }
            State::Closed => return Err(PipelineError::Closed),
        };

        let mut dispatcher = Dispatcher {
            factory: self.factory.clone(),
            lane_buffer: self.lane_buffer,
            lanes: Vec::with_capacity(pending.len()),
            retired: Vec::new(),
            next_index,
            cursor: 0,
            output,
            size: self.size.clone(),
            metrics: self.metrics.clone(),
        };
        let guard = DoneGuard(self.lifecycle.clone());

        for (index, pipeline) in pending {
            if let Err(e) = dispatcher.start_lane(index, pipeline) {
                error!(lane = index, error = %e, "Failed to start lane");
                tokio::spawn(async move {
                    let _guard = guard;
                    dispatcher.shutdown().await;
                });
                return Err(e);
            }
        }

        let (control, control_rx) = mpsc::unbounded_channel();
        let stop = self.lifecycle.stop_signal();
        tokio::spawn(async move {
            let _guard = guard;
            dispatcher.run(input, control_rx, stop).await;
        });
        *state = State::Running { control };
        Ok(())
    }

    fn transaction_chan(&self) -> Option<TransactionReceiver> {
        self.output.lock().take()
    }

    fn close_async(&self) {
        if !self.lifecycle.request_stop() {
            return;
        }
        let mut state = self.state.lock();
        if let State::Idle { lanes, .. } = &*state {
            for (_, pipeline) in lanes {
                pipeline.close_async();
            }
            // Dropping the idle state also drops the output sender.
            *state = State::Closed;
            self.record_size(0);
            self.lifecycle.mark_done();
        }
    }

    async fn wait_for_close(&self, timeout: Duration) -> PipelineResult<()> {
        self.lifecycle.wait_done(timeout).await
    }
}

struct Lane {
    index: usize,
    input: TransactionSender,
    pipeline: Box<dyn Pipeline>,
    relay: JoinHandle<()>,
    dispatched: Counter,
}

impl Lane {
    /// Stops feeding the lane and returns its relay, which ends once the
    /// lane has drained.
    fn retire(self) -> JoinHandle<()> {
        debug!(lane = self.index, "Retiring lane");
        drop(self.input);
        self.pipeline.close_async();
        self.relay
    }
}

/// Forwards a lane's results to the pool output until the lane closes.
async fn relay(index: usize, mut lane_output: TransactionReceiver, output: TransactionSender) {
    while let Some(tran) = lane_output.recv().await {
        if output.send(tran).await.is_err() {
            // The result is dropped, so its sender sees it abandoned.
            warn!(lane = index, "Pool output closed, abandoning result");
        }
    }
    trace!(lane = index, "Lane relay finished");
}

/// Waits for the first lane with room for one more transaction, trying
/// lanes in turn from `cursor`. Resolves to `None` when no lane can accept.
async fn reserve_lane(lanes: &[Lane], cursor: usize) -> Option<usize> {
    if lanes.is_empty() {
        return None;
    }
    let start = cursor % lanes.len();
    let reservations = (start..lanes.len()).chain(0..start).map(move |position| {
        let lane = &lanes[position];
        // The permit is released again; the dispatcher is the only sender,
        // so the slot stays free until the transaction is handed off.
        Box::pin(async move { lane.input.reserve().await.map(|_| position) })
    });
    futures::future::select_ok(reservations)
        .await
        .ok()
        .map(|(position, _)| position)
}

fn undeliverable(metrics: &PoolMetrics, tran: Transaction) {
    error!(transaction_id = %tran.id(), "No lane is accepting transactions");
    metrics.undeliverable.incr(1);
    tran.nack(ResponseError::delivery("no lane is accepting transactions"));
}

/// Owns the running lanes. Lives on the dispatcher task.
struct Dispatcher {
    factory: Arc<LaneFactory>,
    lane_buffer: usize,
    lanes: Vec<Lane>,
    retired: Vec<JoinHandle<()>>,
    next_index: usize,
    cursor: usize,
    output: TransactionSender,
    size: Arc<AtomicUsize>,
    metrics: PoolMetrics,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut input: TransactionReceiver,
        mut control: mpsc::UnboundedReceiver<Resize>,
        mut stop: StopSignal,
    ) {
        info!(lanes = self.lanes.len(), "Pool started");
        let mut closing = false;
        // Read from the input but not yet handed to a lane.
        let mut pending: Option<Transaction> = None;
        loop {
            tokio::select! {
                biased;
                () = stop.stopped(), if !closing => {
                    // Stop accepting and dispatch what is already queued.
                    input.close();
                    closing = true;
                }
                Some(resize) = control.recv() => {
                    // Any reservation in progress is dropped here and the
                    // next one covers the resized lane set.
                    let result = self.resize(resize.size);
                    let _ = resize.reply.send(result);
                }
                reserved = reserve_lane(&self.lanes, self.cursor), if pending.is_some() => {
                    let Some(tran) = pending.take() else { continue };
                    match reserved {
                        Some(position) => pending = self.hand_off(position, tran),
                        None => undeliverable(&self.metrics, tran),
                    }
                }
                next = input.recv(), if pending.is_none() => match next {
                    Some(tran) => pending = Some(tran),
                    None => break,
                },
            }
        }
        self.shutdown().await;
    }

    /// Sends `tran` to the lane at `position`, returning it if the lane
    /// refused it after all.
    fn hand_off(&mut self, position: usize, tran: Transaction) -> Option<Transaction> {
        let lane = &self.lanes[position];
        let id = tran.id();
        match lane.input.try_send(tran) {
            Ok(()) => {
                trace!(lane = lane.index, transaction_id = %id, "Dispatching transaction");
                lane.dispatched.incr(1);
                self.cursor = position + 1;
                None
            }
            Err(e) => {
                debug!(lane = lane.index, transaction_id = %id, "Lane refused transaction");
                Some(e.into_inner())
            }
        }
    }

    fn start_lane(&mut self, index: usize, pipeline: Box<dyn Pipeline>) -> PipelineResult<()> {
        let Some(lane_output) = pipeline.transaction_chan() else {
            return Err(PipelineError::Construction(format!(
                "output of lane {index} was already taken"
            )));
        };
        let (input, lane_input) = transaction_channel(self.lane_buffer);
        pipeline.consume(lane_input)?;

        let relay = tokio::spawn(relay(index, lane_output, self.output.clone()));
        let label = index.to_string();
        self.lanes.push(Lane {
            index,
            input,
            pipeline,
            relay,
            dispatched: self.metrics.dispatched.with(&[label.as_str()]),
        });
        trace!(lane = index, "Lane started");
        Ok(())
    }

    fn resize(&mut self, size: usize) -> PipelineResult<()> {
        let result = self.grow_or_shrink(size);
        self.retired.retain(|relay| !relay.is_finished());
        record_size(&self.size, &self.metrics, self.lanes.len());
        debug!(lanes = self.lanes.len(), "Pool resized");
        result
    }

    fn grow_or_shrink(&mut self, size: usize) -> PipelineResult<()> {
        if size == 0 {
            return Err(PipelineError::InvalidSize(0));
        }
        while self.lanes.len() < size {
            let index = self.next_index;
            self.next_index += 1;
            let pipeline = (self.factory)(index)?;
            self.start_lane(index, pipeline)?;
        }
        while self.lanes.len() > size {
            if let Some(lane) = self.lanes.pop() {
                self.retired.push(lane.retire());
            }
        }
        Ok(())
    }

    /// Retires every lane and waits for all of them to drain.
    async fn shutdown(mut self) {
        for lane in std::mem::take(&mut self.lanes) {
            self.retired.push(lane.retire());
        }
        for relay in std::mem::take(&mut self.retired) {
            if let Err(e) = relay.await {
                error!(error = %e, "Lane relay failed");
            }
        }
        record_size(&self.size, &self.metrics, 0);
        info!("Pool stopped");
    }
}
