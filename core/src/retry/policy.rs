// Copyright 2026 Graceful HTTP Client Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Retry policy data: the fields an endpoint configures, not the loop that
//! executes them (see [crate::retry::engine]).
//!
//! Grounded in the teacher's `retry_policy.rs`/`options.rs` split between
//! policy *data* (here) and policy *decisions* (the engine), but flattened:
//! the source spec describes one `RetryPolicy` record per endpoint rather
//! than the teacher's pluggable `RetryPolicy` trait, so this module holds
//! plain data and the `RetryEngine` interprets it directly.

use crate::error::ErrorKind;
use crate::log_event::LogEvent;
use std::collections::HashMap;
use std::time::Duration;

/// A matcher against a failed attempt's outcome: either a status code or an
/// [ErrorKind]. `retry_on = None` means "any failure retries".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetryOn {
    Status(u16),
    Kind(ErrorKind),
}

/// What happens when retries are exhausted without success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RetryBehavior {
    /// Raise `retry_exhausted`, wrapping the last outcome (default).
    #[default]
    Break,
    /// Treat the last response as if it had succeeded and continue to the
    /// parser with the original response body.
    Pass,
}

/// A per-status override applied when the last outcome's status matches.
#[derive(Clone, Debug, Default)]
pub struct RetryOverride {
    pub delay_override: Option<Duration>,
    pub retry_on_override: Option<Vec<RetryOn>>,
}

/// The retry behavior configured for an endpoint.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub base_delay: Duration,
    /// Total attempts including the first, so `max_attempts = 1` never retries.
    pub max_attempts: u32,
    pub delay_modifier: f64,
    /// `None` means any failure is retryable.
    pub retry_on: Option<Vec<RetryOn>>,
    pub behavior: RetryBehavior,
    pub overrides: HashMap<u16, RetryOverride>,
    pub log_before_retry: Option<LogEvent>,
    pub log_after_retry: Option<LogEvent>,
    pub log_exhausted: Option<LogEvent>,
}

impl RetryConfig {
    /// No retries: the first failure is terminal.
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_attempts: 1,
            delay_modifier: 1.0,
            retry_on: None,
            behavior: RetryBehavior::Break,
            overrides: HashMap::new(),
            log_before_retry: None,
            log_after_retry: None,
            log_exhausted: None,
        }
    }

    /// Retries server errors (5xx) and transport failures, up to 3 attempts,
    /// doubling the delay each time starting at one second.
    pub fn retry_server_errors() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 3,
            delay_modifier: 2.0,
            retry_on: Some(
                (500..600)
                    .map(RetryOn::Status)
                    .chain([RetryOn::Kind(ErrorKind::Transport)])
                    .collect(),
            ),
            behavior: RetryBehavior::Break,
            overrides: HashMap::new(),
            log_before_retry: None,
            log_after_retry: None,
            log_exhausted: None,
        }
    }

    /// Retries any failed outcome, up to 3 attempts.
    pub fn retry_everything() -> Self {
        Self {
            retry_on: None,
            ..Self::retry_server_errors()
        }
    }

    /// Whether a failure matches this policy's `retry_on` set (or any
    /// override active for `status`).
    pub fn matches(&self, kind: ErrorKind, status: Option<u16>) -> bool {
        let set = status
            .and_then(|s| self.overrides.get(&s))
            .and_then(|o| o.retry_on_override.as_ref())
            .or(self.retry_on.as_ref());
        let Some(set) = set else {
            return true;
        };
        set.iter().any(|entry| match entry {
            RetryOn::Status(s) => status == Some(*s),
            RetryOn::Kind(k) => *k == kind,
        })
    }

    /// The delay before the next attempt, given the attempt count just
    /// failed (1-based) and the status it failed with, if any.
    pub fn delay_for(&self, attempt_count: u32, status: Option<u16>) -> Duration {
        if let Some(over) = status.and_then(|s| self.overrides.get(&s)) {
            if let Some(delay) = over.delay_override {
                return delay;
            }
        }
        let exp = attempt_count.saturating_sub(1) as i32;
        self.base_delay.mul_f64(self.delay_modifier.powi(exp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn none_never_retries() {
        let cfg = RetryConfig::none();
        assert_eq!(cfg.max_attempts, 1);
    }

    #[test_case(ErrorKind::BadStatus, Some(500), true; "500 retries")]
    #[test_case(ErrorKind::BadStatus, Some(503), true; "503 retries")]
    #[test_case(ErrorKind::BadStatus, Some(404), false; "404 does not retry")]
    #[test_case(ErrorKind::BadStatus, Some(200), false; "200 does not retry")]
    #[test_case(ErrorKind::Transport, None, true; "transport errors with no status retry")]
    fn retry_server_errors_matches_5xx_not_4xx(kind: ErrorKind, status: Option<u16>, expected: bool) {
        let cfg = RetryConfig::retry_server_errors();
        assert_eq!(cfg.matches(kind, status), expected);
    }

    #[test]
    fn retry_everything_matches_validator_failure() {
        let cfg = RetryConfig::retry_everything();
        assert!(cfg.matches(ErrorKind::ValidatorFailed, None));
    }

    #[test]
    fn override_replaces_delay_and_retry_on() {
        let mut cfg = RetryConfig::retry_server_errors();
        cfg.overrides.insert(
            429,
            RetryOverride {
                delay_override: Some(Duration::from_secs(30)),
                retry_on_override: Some(vec![RetryOn::Status(429)]),
            },
        );
        assert_eq!(cfg.delay_for(1, Some(429)), Duration::from_secs(30));
        assert!(cfg.matches(ErrorKind::BadStatus, Some(429)));
        assert!(!cfg.matches(ErrorKind::BadStatus, Some(404)));
    }

    #[test]
    fn delay_grows_with_modifier() {
        let cfg = RetryConfig::retry_server_errors();
        assert_eq!(cfg.delay_for(1, Some(500)), Duration::from_secs(1));
        assert_eq!(cfg.delay_for(2, Some(500)), Duration::from_secs(2));
        assert_eq!(cfg.delay_for(3, Some(500)), Duration::from_secs(4));
    }
}
