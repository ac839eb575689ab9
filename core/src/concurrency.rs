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

//! Named concurrency limiting: a counted semaphore per scope key.
//!
//! Grounded in the teacher's use of `tokio::sync::Semaphore` for bounding
//! in-flight work (e.g. `gax-internal`'s connection concerns); `acquire_owned`
//! is used so the returned permit is `'static` and cancellation-safe: a
//! cancelled waiter simply drops the future without ever holding a permit,
//! satisfying spec.md 4.3's "cancellation must not leak a permit".

use crate::log_event::LogEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Whether a concurrency limit is scoped per-endpoint or shared globally
/// across every endpoint using the same [ConcurrencyGate].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConcurrencyScope {
    PerEndpoint,
    Global,
}

/// The concurrency limit configured for an endpoint.
#[derive(Clone, Debug)]
pub struct ConcurrencyPolicy {
    pub limit: u32,
    pub scope: ConcurrencyScope,
    pub log_limit_reached: Option<LogEvent>,
    pub log_limit_freed: Option<LogEvent>,
}

impl ConcurrencyPolicy {
    pub fn new(limit: u32, scope: ConcurrencyScope) -> Self {
        Self {
            limit,
            scope,
            log_limit_reached: None,
            log_limit_freed: None,
        }
    }
}

/// A held concurrency slot. Dropping it releases the permit and, if this
/// was the transition from `limit -> limit - 1` in-flight, emits
/// `log_limit_freed`.
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicU32>,
    limit: u32,
    log_limit_freed: Option<LogEvent>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        if previous == self.limit {
            if let Some(event) = &self.log_limit_freed {
                event.emit(&HashMap::new());
            }
        }
    }
}

/// A mapping from scope key (the URL template, or a singleton global key)
/// to a counted semaphore.
pub struct ConcurrencyGate {
    scopes: Mutex<HashMap<String, Arc<ScopeInner>>>,
}

struct ScopeInner {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicU32>,
    limit: u32,
    log_limit_reached: Option<LogEvent>,
    log_limit_freed: Option<LogEvent>,
}

const GLOBAL_SCOPE_KEY: &str = "\0global";

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self {
            scopes: Mutex::new(HashMap::new()),
        }
    }

    fn scope_key(endpoint_template: &str, policy: &ConcurrencyPolicy) -> String {
        match policy.scope {
            ConcurrencyScope::Global => GLOBAL_SCOPE_KEY.to_string(),
            ConcurrencyScope::PerEndpoint => endpoint_template.to_string(),
        }
    }

    /// Acquires a slot for `endpoint_template` under `policy`, creating the
    /// scope's semaphore on first use. Suspends cooperatively until a slot
    /// is free.
    pub async fn acquire(&self, endpoint_template: &str, policy: &ConcurrencyPolicy) -> Permit {
        let key = Self::scope_key(endpoint_template, policy);
        let inner = {
            let mut scopes = self.scopes.lock().await;
            scopes
                .entry(key)
                .or_insert_with(|| {
                    Arc::new(ScopeInner {
                        semaphore: Arc::new(Semaphore::new(policy.limit as usize)),
                        in_flight: Arc::new(AtomicU32::new(0)),
                        limit: policy.limit,
                        log_limit_reached: policy.log_limit_reached.clone(),
                        log_limit_freed: policy.log_limit_freed.clone(),
                    })
                })
                .clone()
        };

        let permit = inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("ConcurrencyGate semaphore is never closed");
        let previous = inner.in_flight.fetch_add(1, Ordering::AcqRel);
        if previous + 1 == inner.limit {
            if let Some(event) = &inner.log_limit_reached {
                event.emit(&HashMap::new());
            }
        }
        Permit {
            _permit: permit,
            in_flight: inner.in_flight.clone(),
            limit: inner.limit,
            log_limit_freed: inner.log_limit_freed.clone(),
        }
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limits_concurrent_holders() {
        let gate = ConcurrencyGate::new();
        let policy = ConcurrencyPolicy::new(1, ConcurrencyScope::PerEndpoint);
        let first = gate.acquire("/x", &policy).await;

        let gate = Arc::new(gate);
        let policy2 = policy.clone();
        let gate2 = gate.clone();
        let waiting = tokio::spawn(async move { gate2.acquire("/x", &policy2).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
        drop(first);
        let _second = waiting.await.unwrap();
    }

    #[tokio::test]
    async fn global_scope_shared_across_endpoints() {
        let gate = ConcurrencyGate::new();
        let policy = ConcurrencyPolicy::new(1, ConcurrencyScope::Global);
        let _first = gate.acquire("/a", &policy).await;

        let gate = Arc::new(gate);
        let policy2 = policy.clone();
        let gate2 = gate.clone();
        let waiting = tokio::spawn(async move { gate2.acquire("/b", &policy2).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
        waiting.abort();
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_permit() {
        let gate = Arc::new(ConcurrencyGate::new());
        let policy = ConcurrencyPolicy::new(1, ConcurrencyScope::PerEndpoint);
        let first = gate.acquire("/x", &policy).await;

        let gate2 = gate.clone();
        let policy2 = policy.clone();
        let waiting = tokio::spawn(async move { gate2.acquire("/x", &policy2).await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        waiting.abort();
        let _ = waiting.await;
        drop(first);

        let second = gate.acquire("/x", &policy).await;
        drop(second);
    }
}
