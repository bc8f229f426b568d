use thiserror::Error;

/// The one error kind surfaced by the search boundary. Construction,
/// synchronization, query compilation and query execution failures all
/// collapse into this, with the underlying cause attached for diagnostics.
#[derive(Debug, Error)]
#[error("search could not be completed")]
pub struct SearchError {
    #[source]
    source: anyhow::Error,
}

impl From<anyhow::Error> for SearchError {
    fn from(source: anyhow::Error) -> Self {
        Self { source }
    }
}

impl SearchError {
    /// The underlying failure, for callers that want to log more than the
    /// boundary message.
    pub fn cause(&self) -> &anyhow::Error {
        &self.source
    }
}
