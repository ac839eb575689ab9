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

//! Client and per-request configuration.
//!
//! [GracefulConfig] is the behavior bundle attached to a client, a namespace,
//! or a single endpoint. Every field is trinary: unset (inherit from parent),
//! explicitly disabled (clear whatever the parent set), or set to a value.
//! [Setting] carries that trinary state; [GracefulConfig::merge] implements
//! the override rules.

use crate::concurrency::ConcurrencyPolicy;
use crate::log_event::LogEvent;
use crate::parse::ParserMap;
use crate::retry::RetryConfig;
use crate::throttle::ThrottleRule;
use crate::validate::Validator;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// A trinary configuration value: inherited, explicitly cleared, or set.
///
/// `merge(parent, child)` resolves to `child` unless `child` is
/// [Setting::Unset], in which case it resolves to `parent`.
/// [Setting::Disabled] in the child always resolves to [Setting::Unset] in
/// the merged result, clearing whatever the parent set.
#[derive(Clone, Debug, Default)]
pub enum Setting<T> {
    /// Nothing was configured at this level; inherit from the parent.
    #[default]
    Unset,
    /// Explicitly cleared at this level, regardless of the parent's value.
    Disabled,
    /// A concrete value, configured at this level.
    Set(T),
}

impl<T> Setting<T> {
    pub fn set(value: T) -> Self {
        Self::Set(value)
    }

    pub fn as_ref(&self) -> Setting<&T> {
        match self {
            Setting::Unset => Setting::Unset,
            Setting::Disabled => Setting::Disabled,
            Setting::Set(v) => Setting::Set(v),
        }
    }

    /// Resolves this (child-level) setting against a parent value, following
    /// `merge(parent, child).field == child.field` if set, `parent.field`
    /// otherwise, and `Disabled` clearing the result to `None`.
    pub fn merge(self, parent: Option<T>) -> Option<T> {
        match self {
            Setting::Unset => parent,
            Setting::Disabled => None,
            Setting::Set(v) => Some(v),
        }
    }

    /// Converts to a plain `Option`, treating `Disabled` as absent.
    pub fn into_option(self) -> Option<T> {
        match self {
            Setting::Unset | Setting::Disabled => None,
            Setting::Set(v) => Some(v),
        }
    }
}

/// A single status code, or a set of them.
///
/// The spec describes `strict_status_code`/`allowed_status_code` as "a
/// single status or set"; this type unifies both behind one constructor
/// path (`From<u16>` and `From<[u16; N]>`/`FromIterator`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusSet(BTreeSet<u16>);

impl StatusSet {
    pub fn contains(&self, status: u16) -> bool {
        self.0.contains(&status)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<u16> for StatusSet {
    fn from(value: u16) -> Self {
        Self(BTreeSet::from([value]))
    }
}

impl<const N: usize> From<[u16; N]> for StatusSet {
    fn from(value: [u16; N]) -> Self {
        Self(BTreeSet::from(value))
    }
}

impl FromIterator<u16> for StatusSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The behavior bundle merged through a client's endpoint hierarchy.
///
/// Every field is a [Setting] so that a child config can either inherit,
/// explicitly disable, or override each knob independently of the others.
#[derive(Clone, Default)]
pub struct GracefulConfig {
    pub strict_status_code: Setting<StatusSet>,
    pub allowed_status_code: Setting<StatusSet>,
    pub validators: Setting<Vec<Arc<dyn Validator>>>,
    pub parser: Setting<ParserMap>,
    pub retry: Setting<RetryConfig>,
    pub throttling: Setting<Vec<ThrottleRule>>,
    pub concurrent_requests: Setting<ConcurrencyPolicy>,
    /// Bounds the total `execute()` duration including retries (spec.md 159).
    pub timeout: Setting<Duration>,
    /// Bounds a single dispatch attempt, distinct from `timeout`'s overall
    /// budget; mirrors the teacher's `RequestOptions::attempt_timeout`.
    pub attempt_timeout: Setting<Duration>,
    pub log_request: Setting<LogEvent>,
    pub log_response: Setting<LogEvent>,
    pub log_errors: Setting<LogEvent>,
}

impl std::fmt::Debug for GracefulConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GracefulConfig")
            .field("strict_status_code", &self.strict_status_code)
            .field("allowed_status_code", &self.allowed_status_code)
            .field("retry", &self.retry)
            .field("throttling", &self.throttling)
            .field("concurrent_requests", &self.concurrent_requests)
            .field("timeout", &self.timeout)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

/// The effective, fully-resolved configuration for one request.
///
/// Produced by merging a [GracefulConfig] chain (client → namespace →
/// endpoint → per-call override) down to concrete, `Option`-free values
/// where meaningful defaults exist, and `Option<T>` where absence still
/// carries meaning (e.g. "no retry configured").
#[derive(Clone, Debug, Default)]
pub struct EffectiveConfig {
    pub strict_status_code: Option<StatusSet>,
    pub allowed_status_code: Option<StatusSet>,
    pub validators: Vec<Arc<dyn Validator>>,
    pub parser: Option<ParserMap>,
    pub retry: Option<RetryConfig>,
    pub throttling: Vec<ThrottleRule>,
    pub concurrent_requests: Option<ConcurrencyPolicy>,
    pub timeout: Option<Duration>,
    pub attempt_timeout: Option<Duration>,
    pub log_request: Option<LogEvent>,
    pub log_response: Option<LogEvent>,
    pub log_errors: Option<LogEvent>,
}

impl EffectiveConfig {
    /// The set of statuses considered successful for this request.
    ///
    /// `strict` dominates `allowed`: if set, only `strict` counts, otherwise
    /// 2xx plus `allowed` count (spec.md's "Success set").
    pub fn success_set(&self) -> SuccessSet<'_> {
        SuccessSet { config: self }
    }
}

/// A view over [EffectiveConfig] answering "is this status successful".
pub struct SuccessSet<'a> {
    config: &'a EffectiveConfig,
}

impl SuccessSet<'_> {
    pub fn contains(&self, status: u16) -> bool {
        if let Some(strict) = &self.config.strict_status_code {
            return strict.contains(status);
        }
        if (200..300).contains(&status) {
            return true;
        }
        self.config
            .allowed_status_code
            .as_ref()
            .is_some_and(|s| s.contains(status))
    }
}

/// Merges a chain of configs, parent-first, into one [EffectiveConfig].
///
/// Each config in the chain is applied in order; later entries (closer to
/// the call site) take precedence, per spec.md's merge semantics: "child
/// configs override parent field-by-field; an explicit disabled sentinel in
/// the child clears an inherited value; absent fields inherit."
pub fn merge_chain<'a>(chain: impl IntoIterator<Item = &'a GracefulConfig>) -> EffectiveConfig {
    let mut acc = EffectiveConfig::default();
    for cfg in chain {
        acc.strict_status_code = cfg.strict_status_code.clone().merge(acc.strict_status_code);
        acc.allowed_status_code = cfg
            .allowed_status_code
            .clone()
            .merge(acc.allowed_status_code);
        acc.validators = cfg.validators.clone().merge(Some(acc.validators)).unwrap_or_default();
        acc.parser = cfg.parser.clone().merge(acc.parser);
        acc.retry = cfg.retry.clone().merge(acc.retry);
        acc.throttling = cfg
            .throttling
            .clone()
            .merge(Some(acc.throttling))
            .unwrap_or_default();
        acc.concurrent_requests = cfg.concurrent_requests.clone().merge(acc.concurrent_requests);
        acc.timeout = cfg.timeout.clone().merge(acc.timeout);
        acc.attempt_timeout = cfg.attempt_timeout.clone().merge(acc.attempt_timeout);
        acc.log_request = cfg.log_request.clone().merge(acc.log_request);
        acc.log_response = cfg.log_response.clone().merge(acc.log_response);
        acc.log_errors = cfg.log_errors.clone().merge(acc.log_errors);
    }
    acc
}
