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

//! The retry loop state machine.
//!
//! Grounded in the teacher's `retry_loop_internal.rs`: an attempt loop that
//! alternates `attempting -> deciding -> delaying -> attempting`, with each
//! decision expressed as a [LoopState] the caller matches on rather than a
//! boolean. The source spec (4.4) names the same four states; this engine
//! implements them directly against a [RetryConfig] rather than a pluggable
//! policy trait.
//!
//! Delays follow [RetryConfig::delay_for]'s deterministic schedule
//! (`base_delay * delay_modifier^(attempt - 1)`, or the per-status override)
//! with no jitter: spec.md 47 and 205 both describe a fixed schedule, not a
//! uniform draw.

use crate::error::{Error, ErrorKind};
use crate::retry::policy::{RetryBehavior, RetryConfig};
use std::time::{Duration, Instant};

/// The outcome of one `deciding` step.
#[derive(Debug)]
pub enum LoopState {
    /// Stop: the failure doesn't match `retry_on`, or there is no retry
    /// policy at all.
    Permanent(Error),
    /// Stop: `max_attempts` was reached. Distinct from [LoopState::Permanent]
    /// because it fires `log_exhausted` and raises `retry_exhausted`.
    Exhausted(Error),
    /// Keep going: sleep `delay`, then attempt again.
    Continue { error: Error, delay: Duration },
}

impl LoopState {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue { .. })
    }
}

/// Drives the per-request attempt count and elapsed time, deciding after
/// each failed attempt whether to retry.
pub struct RetryEngine {
    config: RetryConfig,
    attempt_count: u32,
    start: Instant,
}

impl RetryEngine {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt_count: 1,
            start: Instant::now(),
        }
    }

    /// The 1-based count of the attempt currently in flight.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn behavior(&self) -> RetryBehavior {
        self.config.behavior
    }

    pub fn config_log_before_retry(&self) -> Option<&crate::log_event::LogEvent> {
        self.config.log_before_retry.as_ref()
    }

    pub fn config_log_after_retry(&self) -> Option<&crate::log_event::LogEvent> {
        self.config.log_after_retry.as_ref()
    }

    pub fn config_log_exhausted(&self) -> Option<&crate::log_event::LogEvent> {
        self.config.log_exhausted.as_ref()
    }

    /// Called after a failed attempt. Returns the next loop state; the
    /// caller sleeps on `Continue` and must call [RetryEngine::advance]
    /// before the next attempt.
    ///
    /// The delay follows [RetryConfig::delay_for]'s deterministic schedule
    /// (or an explicit `delay_override`) — never jittered.
    pub fn on_failure(&self, error: Error, _rng: &mut impl rand::Rng) -> LoopState {
        let status = error.status();
        if !self.config.matches(error.kind(), status) {
            return LoopState::Permanent(error);
        }
        if self.attempt_count >= self.config.max_attempts {
            return LoopState::Exhausted(error);
        }
        let delay = self.config.delay_for(self.attempt_count, status);
        LoopState::Continue { error, delay }
    }

    /// Advances to the next attempt after sleeping.
    pub fn advance(&mut self) {
        self.attempt_count += 1;
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Builds the terminal [Error] for an exhausted retry loop, per
/// `retry_exhausted` carrying the last outcome.
pub fn exhausted_error(last: Error) -> Error {
    debug_assert_ne!(last.kind(), ErrorKind::RetryExhausted);
    Error::retry_exhausted(last)
}
