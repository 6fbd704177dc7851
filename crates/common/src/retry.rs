use std::time::Duration;

/// Backoff policy for connection establishment.
///
/// Both binaries retry exactly one kind of operation: bringing a socket up
/// (the camera node's initial connect to the ingest server, the server's
/// listener bind). Failures there are second-scale transients, the peer not
/// up yet or a port lingering in TIME_WAIT, so the defaults start at 200ms
/// and cap the exponential backoff at 3s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts before the last error is handed back to the caller.
    pub max_attempts: u32,
    /// Initial delay between attempts (doubles each attempt).
    pub base_delay: Duration,
    /// Delay cap; backoff won't exceed this.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Run `establish` until it succeeds or the attempts are exhausted,
    /// sleeping between failures. The final error is returned unchanged so
    /// callers keep their own error types.
    pub fn run<F, T, E>(&self, operation_name: &str, mut establish: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match establish() {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        operation_name,
                        attempt + 1,
                        self.max_attempts,
                        err,
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        "{} failed after {} attempts: {}",
                        operation_name,
                        self.max_attempts,
                        err
                    );
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(800));
        // 1600ms is past the cap.
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn test_run_recovers_after_transient_failures() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_micros(1),
            max_delay: Duration::from_micros(1),
        };

        let mut calls = 0;
        let result: Result<u32, String> = policy.run("flaky", || {
            calls += 1;
            if calls < 3 {
                Err("not yet".to_string())
            } else {
                Ok(7)
            }
        });

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_run_returns_the_last_error_when_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_micros(1),
            max_delay: Duration::from_micros(1),
        };

        let mut calls = 0;
        let result: Result<(), String> = policy.run("down", || {
            calls += 1;
            Err(format!("attempt {calls}"))
        });

        assert_eq!(result.unwrap_err(), "attempt 3");
        assert_eq!(calls, 3);
    }
}
