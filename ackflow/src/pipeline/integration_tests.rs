//! End-to-end tests wiring sources, pipelines and sinks together.

#[cfg(test)]
mod tests {
    use crate::condition::CountCondition;
    use crate::config::PoolConfig;
    use crate::errors::ResponseError;
    use crate::message::Message;
    use crate::metrics::{LocalMetrics, NoopMetrics};
    use crate::pipeline::{Pipeline, Pool, Processor};
    use crate::ports::{Sink, Source};
    use crate::stages::{GateStage, NoOpStage, Stage};
    use crate::testing::{AckingSink, FanOut, MockSource};
    use crate::transaction::Response;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn fan_out_pool(threads: usize, count: usize) -> Pool {
        Pool::with_stages(
            move |_| vec![Box::new(FanOut::new(count)) as Box<dyn Stage>],
            &PoolConfig::new().with_threads(threads),
            NoopMetrics::shared(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_source_pool_sink() {
        let source = MockSource::new(4);
        let pool = fan_out_pool(3, 2);
        let sink = AckingSink::new();

        pool.consume(source.transaction_chan().unwrap()).unwrap();
        sink.consume(pool.transaction_chan().unwrap()).unwrap();

        let mut responses = Vec::new();
        for i in 0..20 {
            responses.push(source.send(Message::new([format!("m{i}")])).await.unwrap());
        }
        for res in responses {
            assert!(res.recv_timeout(TIMEOUT).await.unwrap().is_ack());
        }
        assert_eq!(sink.received_count(), 40);

        source.close_async();
        source.wait_for_close(TIMEOUT).await.unwrap();
        pool.wait_for_close(TIMEOUT).await.unwrap();
        sink.wait_for_close(TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_sink_failures_reach_the_source() {
        let source = MockSource::new(1);
        let pool = fan_out_pool(2, 3);
        let sink = AckingSink::with_response(Response::error(ResponseError::delivery("sink down")));

        pool.consume(source.transaction_chan().unwrap()).unwrap();
        sink.consume(pool.transaction_chan().unwrap()).unwrap();

        for _ in 0..5 {
            let res = source.send(Message::new(["foo"])).await.unwrap();
            assert_eq!(
                res.recv_timeout(TIMEOUT).await.unwrap().err(),
                Some(&ResponseError::delivery("sink down"))
            );
        }

        source.close_async();
        pool.wait_for_close(TIMEOUT).await.unwrap();
        sink.wait_for_close(TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_count_gate_rejects_every_third() {
        let metrics = Arc::new(LocalMetrics::new());
        let source = MockSource::new(1);
        let processor = Processor::new(
            vec![Box::new(GateStage::new("gate", CountCondition::new(3)))],
            metrics.clone(),
        );
        let sink = AckingSink::new();

        processor.consume(source.transaction_chan().unwrap()).unwrap();
        sink.consume(processor.transaction_chan().unwrap()).unwrap();

        let mut outcomes = Vec::new();
        for i in 0..6 {
            let res = source.send(Message::new([format!("m{i}")])).await.unwrap();
            outcomes.push(res.recv_timeout(TIMEOUT).await.unwrap().is_ack());
        }
        assert_eq!(outcomes, vec![true, true, false, true, true, false]);
        assert_eq!(sink.received_count(), 4);
        assert_eq!(metrics.counter_value("pipeline.processor.received{lane=0}"), Some(6));
        assert_eq!(metrics.counter_value("pipeline.processor.dropped{lane=0}"), Some(2));
        assert_eq!(metrics.counter_value("pipeline.processor.sent{lane=0}"), Some(4));

        source.close_async();
        processor.wait_for_close(TIMEOUT).await.unwrap();
        sink.wait_for_close(TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_processor_feeding_pool() {
        let source = MockSource::new(1);
        let front = Processor::new(vec![Box::new(FanOut::new(2))], NoopMetrics::shared());
        let back = fan_out_pool(2, 2);
        let sink = AckingSink::new();

        front.consume(source.transaction_chan().unwrap()).unwrap();
        back.consume(front.transaction_chan().unwrap()).unwrap();
        sink.consume(back.transaction_chan().unwrap()).unwrap();

        let res = source.send(Message::new(["foo"])).await.unwrap();
        assert!(res.recv_timeout(TIMEOUT).await.unwrap().is_ack());
        assert_eq!(sink.received_count(), 4);

        source.close_async();
        front.wait_for_close(TIMEOUT).await.unwrap();
        back.wait_for_close(TIMEOUT).await.unwrap();
        sink.wait_for_close(TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_pool_of_pools() {
        let source = MockSource::new(2);
        let pool = Pool::new(
            |_| {
                Pool::with_stages(
                    |_| vec![Box::new(NoOpStage::default()) as Box<dyn Stage>],
                    &PoolConfig::new().with_threads(2),
                    NoopMetrics::shared(),
                )
            },
            2,
            NoopMetrics::shared(),
        )
        .unwrap();
        let sink = AckingSink::new();

        pool.consume(source.transaction_chan().unwrap()).unwrap();
        sink.consume(pool.transaction_chan().unwrap()).unwrap();

        let mut responses = Vec::new();
        for i in 0..10 {
            responses.push(source.send(Message::new([format!("m{i}")])).await.unwrap());
        }
        for res in responses {
            assert!(res.recv_timeout(TIMEOUT).await.unwrap().is_ack());
        }

        let mut seen: Vec<_> = sink
            .received()
            .iter()
            .map(|msg| String::from_utf8(msg.all_bytes()[0].to_vec()).unwrap())
            .collect();
        seen.sort();
        let mut expected: Vec<_> = (0..10).map(|i| format!("m{i}")).collect();
        expected.sort();
        assert_eq!(seen, expected);

        source.close_async();
        pool.wait_for_close(TIMEOUT).await.unwrap();
        sink.wait_for_close(TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_pool_handle_resized_while_running() {
        let source = MockSource::new(1);
        let pool = Arc::new(fan_out_pool(1, 1));
        let sink = AckingSink::new();

        pool.consume(source.transaction_chan().unwrap()).unwrap();
        sink.consume(pool.transaction_chan().unwrap()).unwrap();

        let resizer = {
            let pool = pool.clone();
            tokio::spawn(async move {
                for size in [4, 2, 3, 1] {
                    pool.set_size(size).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut responses = Vec::new();
        for i in 0..30 {
            responses.push(source.send(Message::new([format!("m{i}")])).await.unwrap());
        }
        resizer.await.unwrap();
        for res in responses {
            assert!(res.recv_timeout(TIMEOUT).await.unwrap().is_ack());
        }
        assert_eq!(pool.size(), 1);
        assert_eq!(sink.received_count(), 30);

        source.close_async();
        let as_pipeline: Arc<dyn Pipeline> = pool;
        as_pipeline.wait_for_close(TIMEOUT).await.unwrap();
        sink.wait_for_close(TIMEOUT).await.unwrap();
    }
}
