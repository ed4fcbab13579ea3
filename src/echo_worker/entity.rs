use super::error::EchoError;
use crate::framework::WorkerEntity;
use crate::message::DispatchRequest;
use crate::pool::WorkerId;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Replies with `"{payload} (served by {worker} on {node}, #{n})"`.
#[derive(Debug, Clone)]
pub struct EchoWorker {
    id: WorkerId,
    node: String,
    delay: Duration,
    served: u64,
}

impl EchoWorker {
    pub fn new(id: WorkerId, node: impl Into<String>) -> Self {
        Self {
            id,
            node: node.into(),
            delay: Duration::ZERO,
            served: 0,
        }
    }

    /// Simulated processing time before each reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn served(&self) -> u64 {
        self.served
    }
}

#[async_trait]
impl WorkerEntity for EchoWorker {
    type Context = ();
    type Error = EchoError;

    async fn handle(
        &mut self,
        request: DispatchRequest,
        _ctx: &Self::Context,
    ) -> Result<String, Self::Error> {
        if request.payload.is_empty() {
            return Err(EchoError::EmptyPayload(request.correlation_token));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.served += 1;
        debug!(worker = %self.id, served = self.served, "Echo");
        Ok(format!(
            "{} (served by {} on {}, #{})",
            request.payload, self.id, self.node, self.served
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_counts_and_stamps_replies() {
        let mut worker = EchoWorker::new(WorkerId::from("console-1"), "akka.tcp://ClusterSys@localhost:4055");
        let reply = worker
            .handle(DispatchRequest::new("Cluster.Ask", "c-1", "hit from c-1"), &())
            .await
            .unwrap();
        assert_eq!(
            reply,
            "hit from c-1 (served by console-1 on akka.tcp://ClusterSys@localhost:4055, #1)"
        );
        assert_eq!(worker.served(), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_is_refused() {
        let mut worker = EchoWorker::new(WorkerId::from("console-1"), "node");
        let result = worker.handle(DispatchRequest::new("op", "c-9", ""), &()).await;
        assert_eq!(result, Err(EchoError::EmptyPayload("c-9".to_string())));
        assert_eq!(worker.served(), 0);
    }
}
