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

//! A graceful HTTP client framework: config-driven retries, throttling,
//! concurrency limits, validation, parsing, replay, hooks, and metrics
//! layered around a pluggable [transport::Transport].
//!
//! Grounded in the teacher crate's `gax`/`gax-internal` split: this crate
//! (`graceful-gax`) holds the transport-agnostic request lifecycle, while a
//! sibling crate (`transport-reqwest`) supplies the concrete HTTP client.

pub mod client;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod log_event;
pub mod metrics;
pub mod parse;
pub mod pipeline;
pub mod replay;
pub mod retry;
pub mod throttle;
pub mod transport;
pub mod validate;

pub use error::{Error, Result};
