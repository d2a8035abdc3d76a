//! Bounded retry combinator with an explicit acceptance check.

use std::future::Future;

/// Result of [`retry_with_validator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// An attempt produced a value the validator accepted.
    Accepted {
        /// Accepted value.
        value: T,
        /// Attempts used, including the successful one.
        attempts: usize,
    },
    /// Every attempt failed or was rejected.
    Exhausted {
        /// Attempts used.
        attempts: usize,
        /// Error from the final attempt, if any attempt ran.
        last_error: Option<E>,
    },
}

/// Run `attempt` up to `max_attempts` times until `validate` accepts its output.
///
/// `attempt` receives the one-based attempt number. Failures from either the attempt or the
/// validator count against the budget; nothing sleeps between attempts.
pub async fn retry_with_validator<R, T, E, A, Fut, V>(
    max_attempts: usize,
    mut attempt: A,
    mut validate: V,
) -> RetryOutcome<T, E>
where
    A: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    V: FnMut(R) -> Result<T, E>,
{
    let mut last_error = None;
    for number in 1..=max_attempts {
        match attempt(number).await.and_then(&mut validate) {
            Ok(value) => {
                return RetryOutcome::Accepted {
                    value,
                    attempts: number,
                };
            }
            Err(error) => last_error = Some(error),
        }
    }
    RetryOutcome::Exhausted {
        attempts: max_attempts,
        last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_first_valid_result() {
        let outcome = retry_with_validator(
            3,
            |n| async move { Ok::<_, String>(n) },
            |n| if n == 2 { Ok(n * 10) } else { Err(format!("rejected {n}")) },
        )
        .await;
        assert_eq!(
            outcome,
            RetryOutcome::Accepted {
                value: 20,
                attempts: 2
            }
        );
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let mut calls = 0;
        let outcome: RetryOutcome<(), String> = retry_with_validator(
            3,
            |n| {
                calls += 1;
                async move { Err::<(), _>(format!("failed {n}")) }
            },
            Ok,
        )
        .await;
        assert_eq!(calls, 3);
        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 3,
                last_error: Some("failed 3".into())
            }
        );
    }
}
