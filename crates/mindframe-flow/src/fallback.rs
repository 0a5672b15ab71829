//! Graceful degradation for remote model calls.
//!
//! Every model call site in this crate goes through [`or_fallback`]: run the
//! call under an explicit timeout and, on any failure, return the supplied
//! default instead of propagating. A turn therefore always completes with
//! *some* value; degraded turns are visible in the logs, not to the caller.

use crate::error::FlowResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Await `fut` for at most `limit`; on error or timeout return `default`.
pub async fn or_fallback<T, F>(what: &str, limit: Duration, fut: F, default: T) -> T
where
    F: Future<Output = FlowResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!("{} degraded to fallback: {}", what, e);
            default
        }
        Err(_) => {
            warn!("{} timed out after {:?}, using fallback", what, limit);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;

    #[tokio::test]
    async fn passes_through_success() {
        let value = or_fallback(
            "test",
            Duration::from_secs(1),
            async { Ok::<_, FlowError>(42) },
            0,
        )
        .await;
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn swallows_errors() {
        let value = or_fallback(
            "test",
            Duration::from_secs(1),
            async { Err::<i32, _>(FlowError::Model("boom".to_string())) },
            7,
        )
        .await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn enforces_the_timeout() {
        let value = or_fallback(
            "test",
            Duration::from_millis(10),
            std::future::pending::<FlowResult<i32>>(),
            9,
        )
        .await;
        assert_eq!(value, 9);
    }
}
