use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Retry a fallible future factory up to `tries` times, with a starting delay of
/// `base_delay` and an exponential backoff.
pub async fn retry<F, Fut, T, E>(mut f: F, tries: u32, base_delay: Duration) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempts = 0;
    loop {
        match f().await {
            Ok(output) => return Ok(output),
            Err(e) => {
                attempts += 1;
                if attempts >= tries {
                    return Err(e);
                }

                tracing::debug!("Attempt {} failed, retrying: {}", attempts, e);
                tokio::time::sleep(base_delay * 2_u32.pow(attempts.min(MAX_BACKOFF_EXPONENT)))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = &AtomicU32::new(0);
        let result: Result<u32, String> = retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {n}"))
                } else {
                    Ok(n)
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), String> = retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("unavailable".to_string())
            },
            2,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Err("unavailable".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
