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

//! Response validators: user-pluggable checks run after the status check.

use crate::context::RequestContext;
use crate::error::Error;
use crate::transport::RawResponse;
use std::fmt;

/// A single response validator, invoked only after the status check has
/// already passed. Multiple validators run in declaration order; the first
/// failure short-circuits the rest (spec.md 4.5).
pub trait Validator: Send + Sync {
    fn check(&self, ctx: &RequestContext, response: &RawResponse) -> Result<(), Error>;
}

impl fmt::Debug for dyn Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator")
    }
}

/// Runs `validators` in order against `response`, stopping at the first
/// failure.
pub fn run_validators(
    validators: &[std::sync::Arc<dyn Validator>],
    ctx: &RequestContext,
    response: &RawResponse,
) -> Result<(), Error> {
    for validator in validators {
        validator.check(ctx, response)?;
    }
    Ok(())
}

/// A validator built from a closure, for ad-hoc checks that don't warrant a
/// named type.
pub struct FnValidator<F>(pub F)
where
    F: Fn(&RequestContext, &RawResponse) -> Result<(), Error> + Send + Sync;

impl<F> Validator for FnValidator<F>
where
    F: Fn(&RequestContext, &RawResponse) -> Result<(), Error> + Send + Sync,
{
    fn check(&self, ctx: &RequestContext, response: &RawResponse) -> Result<(), Error> {
        (self.0)(ctx, response)
    }
}
