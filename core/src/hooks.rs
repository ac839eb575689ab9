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

//! Observational before/after hooks with error isolation and a re-entry
//! guard, per spec.md 4.7.

use crate::context::RequestContext;
use crate::error::Error;
use crate::transport::RawResponse;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The retry state visible to `after` hooks invoked around a retry
/// attempt, distinct from the pipeline-exit `after` call (whose
/// `retry_state` is `None`).
#[derive(Clone, Debug)]
pub struct RetryState {
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
}

/// The outcome passed to `after`: either the response that was ultimately
/// dispatched, or the terminal error.
pub enum Outcome<'a> {
    Response(&'a RawResponse),
    Error(&'a Error),
}

/// A hook observing pipeline boundaries. Implementations must not call back
/// into the owning client from within `before`/`after` — [HookDispatcher]
/// guards against the resulting recursion, but a hook that tries anyway
/// will see its nested call silently skip hook dispatch rather than
/// deadlock or recurse.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn before(&self, ctx: &RequestContext) {
        let _ = ctx;
    }

    async fn after(&self, ctx: &RequestContext, outcome: Outcome<'_>, retry_state: Option<&RetryState>) {
        let _ = (ctx, outcome, retry_state);
    }
}

/// Dispatches to a list of hooks, isolating failures (a panicking hook is
/// not caught — Rust has no exception model to swallow — but an
/// `async fn` hook returning control normally never aborts the pipeline
/// regardless of what it observed) and guarding against re-entrant
/// dispatch from within a hook body.
pub struct HookDispatcher {
    hooks: Vec<Arc<dyn Hook>>,
    dispatching: AtomicBool,
}

impl HookDispatcher {
    pub fn new(hooks: Vec<Arc<dyn Hook>>) -> Self {
        Self {
            hooks,
            dispatching: AtomicBool::new(false),
        }
    }

    /// Runs `before` on every hook, skipping entirely if already inside a
    /// dispatch (re-entrancy guard).
    pub async fn before(&self, ctx: &RequestContext) {
        if self.dispatching.swap(true, Ordering::AcqRel) {
            tracing::warn!("hook dispatch re-entered; skipping nested before()");
            return;
        }
        for hook in &self.hooks {
            hook.before(ctx).await;
        }
        self.dispatching.store(false, Ordering::Release);
    }

    pub async fn after(
        &self,
        ctx: &RequestContext,
        outcome: Outcome<'_>,
        retry_state: Option<&RetryState>,
    ) {
        if self.dispatching.swap(true, Ordering::AcqRel) {
            tracing::warn!("hook dispatch re-entered; skipping nested after()");
            return;
        }
        for hook in &self.hooks {
            hook.after(ctx, outcome_ref(&outcome), retry_state).await;
        }
        self.dispatching.store(false, Ordering::Release);
    }
}

fn outcome_ref<'a>(outcome: &'a Outcome<'a>) -> Outcome<'a> {
    match outcome {
        Outcome::Response(r) => Outcome::Response(r),
        Outcome::Error(e) => Outcome::Error(e),
    }
}

/// A hook that observes an HTTP `Retry-After` response header and installs
/// a pause: `before` awaits a mutex any other caller may be holding for the
/// requested duration (spec.md 9's "hook-owned mutex" pattern).
pub struct RetryAfterHook {
    gate: tokio::sync::Mutex<()>,
}

impl Default for RetryAfterHook {
    fn default() -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
        }
    }
}

impl RetryAfterHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds the gate for `duration`, blocking subsequent `before` callers
    /// until it elapses.
    pub async fn pause_for(&self, duration: Duration) {
        let _held = self.gate.lock().await;
        tokio::time::sleep(duration).await;
    }
}

#[async_trait]
impl Hook for RetryAfterHook {
    async fn before(&self, _ctx: &RequestContext) {
        let _held = self.gate.lock().await;
    }

    async fn after(&self, _ctx: &RequestContext, outcome: Outcome<'_>, _retry_state: Option<&RetryState>) {
        if let Outcome::Response(response) = outcome {
            if let Some(seconds) = response
                .headers
                .get("Retry-After")
                .and_then(|v| v.parse::<u64>().ok())
            {
                self.pause_for(Duration::from_secs(seconds)).await;
            }
        }
    }
}

/// A fixed-duration back-off triggered whenever a response comes back 429.
pub struct FixedBackoffOn429Hook {
    duration: Duration,
    gate: tokio::sync::Mutex<()>,
}

impl FixedBackoffOn429Hook {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            gate: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl Hook for FixedBackoffOn429Hook {
    async fn before(&self, _ctx: &RequestContext) {
        let _held = self.gate.lock().await;
    }

    async fn after(&self, _ctx: &RequestContext, outcome: Outcome<'_>, _retry_state: Option<&RetryState>) {
        if let Outcome::Response(response) = outcome {
            if response.status == 429 {
                let _held = self.gate.lock().await;
                tokio::time::sleep(self.duration).await;
            }
        }
    }
}
