use crate::error::FeedError;
use config::RetryPolicy;
use std::future::Future;
use tokio::time::{sleep, timeout};
use tracing::warn;

/// Runs `attempt` until it succeeds, giving every try at most
/// `attempt_timeout` and sleeping with exponential backoff in between.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, FeedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        let error = match timeout(policy.attempt_timeout, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => FeedError::Timeout {
                operation,
                timeout: policy.attempt_timeout,
            },
        };
        attempts += 1;
        if attempts >= max_attempts {
            return Err(FeedError::RetriesExhausted {
                operation,
                attempts,
                last: Box::new(error),
            });
        }

        let delay = policy.backoff(attempts - 1);
        warn!(
            operation,
            attempt = attempts,
            max_attempts,
            ?delay,
            "Retrying after error: {}",
            error
        );
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            attempt_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let value = with_retry(&policy(3), "lookup", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FeedError::Provider(ProviderError::Rpc("busy".to_string())))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_retry(&policy(2), "lookup", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FeedError::MissingBlockNumber)
        })
        .await;
        assert!(matches!(
            result,
            Err(FeedError::RetriesExhausted { attempts: 2, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempts_time_out() {
        let result: Result<(), _> = with_retry(&policy(2), "query", || async {
            sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;
        match result {
            Err(FeedError::RetriesExhausted { last, .. }) => {
                assert!(matches!(*last, FeedError::Timeout { operation: "query", .. }))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
