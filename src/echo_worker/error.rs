//! Errors returned by [`EchoWorker`](super::EchoWorker).

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EchoError {
    #[error("Empty payload for request {0}")]
    EmptyPayload(String),
}
