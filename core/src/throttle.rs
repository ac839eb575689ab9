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

//! Sliding-window rate limiting, one state per regex-matched rule.
//!
//! A per-rule token bucket refilled on a fixed cadence does not model a
//! sliding window whose `per_time` can exceed a second (spec.md 4.2), so
//! admission is decided against a deque of recent timestamps under one
//! shared lock, grounded in the same "single coordination point decides
//! admission" shape as the [other_examples throttle][other_examples] file
//! this module draws its `DashMap`-per-scope structure from, adapted to a
//! single shared lock (the spec requires all matching rules admit
//! atomically, which per-key sharding cannot provide).
//!
//! [other_examples]: ../../examples/other_examples/1319811b_zhubby-moltis__crates-gateway-src-request_throttle.rs.rs

use crate::log_event::LogEvent;
use regex::Regex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A rule matching requests whose formatted URL matches `url_pattern`,
/// admitting at most `max_requests` within any `per_time` window.
#[derive(Debug)]
pub struct ThrottleRule {
    pub url_pattern: Regex,
    pub max_requests: u32,
    pub per_time: Duration,
}

impl Clone for ThrottleRule {
    fn clone(&self) -> Self {
        Self {
            url_pattern: self.url_pattern.clone(),
            max_requests: self.max_requests,
            per_time: self.per_time,
        }
    }
}

impl ThrottleRule {
    pub fn new(url_pattern: Regex, max_requests: u32, per_time: Duration) -> Self {
        Self {
            url_pattern,
            max_requests,
            per_time,
        }
    }
}

/// Per-rule sliding-window state: recent admission timestamps and whether
/// a "limit reached" log has already fired for the current saturation
/// event (cleared once the rule admits again).
#[derive(Debug, Default)]
struct ThrottleState {
    timestamps: VecDeque<Instant>,
    saturated: bool,
}

/// Owns one [ThrottleState] per configured rule and serializes admission
/// decisions behind a single lock, so that a single-request-budget rule is
/// respected across concurrent callers (spec.md 4.2).
pub struct ThrottleController {
    rules: Vec<ThrottleRule>,
    states: Mutex<Vec<ThrottleState>>,
    pub log_limit_reached: Option<LogEvent>,
    pub log_wait_over: Option<LogEvent>,
}

impl ThrottleController {
    pub fn new(rules: Vec<ThrottleRule>) -> Self {
        let states = rules.iter().map(|_| ThrottleState::default()).collect();
        Self {
            rules,
            states: Mutex::new(states),
            log_limit_reached: None,
            log_wait_over: None,
        }
    }

    /// Suspends until `url` may be admitted under every rule it matches,
    /// then records the admission and returns.
    pub async fn await_admission(&self, url: &str) {
        loop {
            let now = Instant::now();
            let (wait, newly_saturated, resumed) = {
                let mut states = self.states.lock().await;
                let matched: Vec<usize> = self
                    .rules
                    .iter()
                    .enumerate()
                    .filter(|(_, rule)| rule.url_pattern.is_match(url))
                    .map(|(i, _)| i)
                    .collect();

                let mut wait = Duration::ZERO;
                for &i in &matched {
                    let rule = &self.rules[i];
                    let state = &mut states[i];
                    let oldest_allowed = now.checked_sub(rule.per_time).unwrap_or(now);
                    while matches!(state.timestamps.front(), Some(t) if *t <= oldest_allowed) {
                        state.timestamps.pop_front();
                    }
                    let rule_wait = if (state.timestamps.len() as u32) < rule.max_requests {
                        Duration::ZERO
                    } else {
                        let oldest_remaining = *state.timestamps.front().expect("saturated rule has a timestamp");
                        (oldest_remaining + rule.per_time).saturating_duration_since(now)
                    };
                    wait = wait.max(rule_wait);
                }

                let mut newly_saturated = Vec::new();
                let mut resumed = Vec::new();
                if wait.is_zero() {
                    for &i in &matched {
                        states[i].timestamps.push_back(now);
                        if states[i].saturated {
                            states[i].saturated = false;
                            resumed.push(i);
                        }
                    }
                } else {
                    for &i in &matched {
                        if !states[i].saturated {
                            states[i].saturated = true;
                            newly_saturated.push(i);
                        }
                    }
                }
                (wait, newly_saturated, resumed)
            };

            if wait.is_zero() {
                if let Some(event) = &self.log_wait_over {
                    for _ in &resumed {
                        event.emit(&std::collections::HashMap::new());
                    }
                }
                return;
            }

            if let Some(event) = &self.log_limit_reached {
                for _ in &newly_saturated {
                    event.emit(&std::collections::HashMap::new());
                }
            }
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_limit_then_waits() {
        let controller = ThrottleController::new(vec![ThrottleRule::new(
            Regex::new(".*").unwrap(),
            2,
            Duration::from_secs(1),
        )]);
        controller.await_admission("/x").await;
        controller.await_admission("/x").await;

        // `Instant` (std) doesn't advance under a paused+auto-advancing tokio
        // clock; `tokio::time::Instant` does.
        let start = tokio::time::Instant::now();
        controller.await_admission("/x").await;
        assert!(tokio::time::Instant::now() - start >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn non_matching_url_admits_immediately() {
        let controller = ThrottleController::new(vec![ThrottleRule::new(
            Regex::new("^/only-this$").unwrap(),
            1,
            Duration::from_secs(60),
        )]);
        controller.await_admission("/other").await;
        controller.await_admission("/other").await;
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_rules_both_must_admit() {
        let loose = ThrottleRule::new(Regex::new(".*").unwrap(), 10, Duration::from_secs(1));
        let strict = ThrottleRule::new(Regex::new("^/x$").unwrap(), 1, Duration::from_secs(1));
        let controller = ThrottleController::new(vec![loose, strict]);
        controller.await_admission("/x").await;

        let start = tokio::time::Instant::now();
        controller.await_admission("/x").await;
        assert!(tokio::time::Instant::now() - start >= Duration::from_millis(900));
    }
}
