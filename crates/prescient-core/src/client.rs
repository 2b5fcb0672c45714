//! Query client port
//!
//! The one remote capability the fetcher needs: run a query and return its
//! result. Transport, auth and schema are the implementor's business.

use futures::future::BoxFuture;
use serde_json::Value;

/// Failure reported by a query client
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// The backend rejected or failed the query
    #[error("Query failed: {0}")]
    Failed(String),
    /// The backend could not be reached
    #[error("Transport error: {0}")]
    Transport(String),
    /// The backend did not answer in time
    #[error("Query timed out after {0}ms")]
    Timeout(u64),
}

/// Executes queries against the remote data source
pub trait QueryClient: Send + Sync {
    fn query<'a>(
        &'a self,
        query: &'a str,
        variables: Option<&'a Value>,
    ) -> BoxFuture<'a, Result<Value, QueryError>>;
}
