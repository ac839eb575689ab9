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

//! Per-endpoint counters and timers, keyed by `(method, unformatted_endpoint)`.

use crate::transport::Method;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const TIMELINE_CAPACITY: usize = 256;

/// A single terminal outcome, as seen by the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeBucket {
    Status2xx,
    Status3xx,
    Status4xx,
    Status5xx,
    Other,
    Aborted,
}

impl OutcomeBucket {
    pub fn from_status(status: u16) -> Self {
        match status / 100 {
            2 => Self::Status2xx,
            3 => Self::Status3xx,
            4 => Self::Status4xx,
            5 => Self::Status5xx,
            _ => Self::Other,
        }
    }
}

/// Per-key counters and timers, plus a bounded timeline for reporting.
#[derive(Debug, Default)]
struct Entry {
    total: u64,
    status_2xx: u64,
    status_3xx: u64,
    status_4xx: u64,
    status_5xx: u64,
    other: u64,
    aborted: u64,
    retried: u64,
    throttled: u64,
    replayed: u64,
    elapsed_sum: Duration,
    elapsed_max: Duration,
    first_request: Option<Instant>,
    last_request: Option<Instant>,
    successes: u64,
    timeline: std::collections::VecDeque<(Instant, OutcomeBucket)>,
}

/// The outcome of a single `execute()` call, recorded exactly once
/// regardless of how many attempts it took (spec.md 8's "exactly one
/// terminal outcome" invariant).
///
/// `counted_as_success` reflects the *effective* success set (`strict` if
/// set, else 2xx ∪ `allowed`) rather than assuming 2xx/3xx, since a 404 in
/// `allowed_status_code` is a success for reporting purposes (spec.md 4.8).
#[derive(Debug)]
pub struct Recording {
    pub bucket: OutcomeBucket,
    pub counted_as_success: bool,
    pub elapsed: Duration,
    pub retried: bool,
    pub throttled: bool,
    pub replayed: bool,
}

/// Counters and timers aggregated per `(method, unformatted_endpoint)`.
#[derive(Default)]
pub struct MetricsCollector {
    entries: Mutex<HashMap<(Method, String), Entry>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: (Method, String), recording: Recording) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("metrics lock poisoned");
        let entry = entries.entry(key).or_default();
        entry.total += 1;
        match recording.bucket {
            OutcomeBucket::Status2xx => entry.status_2xx += 1,
            OutcomeBucket::Status3xx => entry.status_3xx += 1,
            OutcomeBucket::Status4xx => entry.status_4xx += 1,
            OutcomeBucket::Status5xx => entry.status_5xx += 1,
            OutcomeBucket::Other => entry.other += 1,
            OutcomeBucket::Aborted => entry.aborted += 1,
        }
        if recording.retried {
            entry.retried += 1;
        }
        if recording.throttled {
            entry.throttled += 1;
        }
        if recording.replayed {
            entry.replayed += 1;
        }
        if recording.counted_as_success {
            entry.successes += 1;
        }
        entry.elapsed_sum += recording.elapsed;
        entry.elapsed_max = entry.elapsed_max.max(recording.elapsed);
        entry.first_request.get_or_insert(now);
        entry.last_request = Some(now);
        if entry.timeline.len() == TIMELINE_CAPACITY {
            entry.timeline.pop_front();
        }
        entry.timeline.push_back((now, recording.bucket));
    }

    /// A snapshot report for `key`, or `None` if nothing has been recorded.
    pub fn report(&self, key: &(Method, String)) -> Option<Report> {
        let entries = self.entries.lock().expect("metrics lock poisoned");
        let entry = entries.get(key)?;
        let success_rate = if entry.total == 0 {
            0.0
        } else {
            entry.successes as f64 / entry.total as f64
        };
        let average_latency = if entry.total == 0 {
            Duration::ZERO
        } else {
            entry.elapsed_sum / entry.total as u32
        };
        let requests_per_second = match (entry.first_request, entry.last_request) {
            (Some(first), Some(last)) if last > first => {
                entry.total as f64 / (last - first).as_secs_f64()
            }
            _ => 0.0,
        };
        Some(Report {
            total: entry.total,
            success_rate,
            average_latency,
            max_latency: entry.elapsed_max,
            requests_per_second,
            retried: entry.retried,
            throttled: entry.throttled,
            replayed: entry.replayed,
        })
    }
}

/// An aggregate view over one endpoint's counters, computed on demand.
#[derive(Debug, Clone, Copy)]
pub struct Report {
    pub total: u64,
    pub success_rate: f64,
    pub average_latency: Duration,
    pub max_latency: Duration,
    pub requests_per_second: f64,
    pub retried: u64,
    pub throttled: u64,
    pub replayed: u64,
}
