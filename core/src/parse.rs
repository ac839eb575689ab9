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

//! Status-keyed response transformation.
//!
//! Per spec.md's design notes, the source's parser map mixes integer status
//! keys with the string sentinel `"default"`; this is modeled as an
//! explicit `default` field plus a status-keyed map, and the three parser
//! entry kinds become a sum type rather than heterogeneous callables.

use crate::context::RequestContext;
use crate::error::Error;
use crate::transport::RawResponse;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A value produced by a successful parse. `Null` models the source's
/// `nil` sentinel entry, distinct from a `Transform` that happens to
/// produce an empty body.
#[derive(Debug, Clone)]
pub enum ParsedValue {
    Null,
    Json(serde_json::Value),
    Raw(bytes::Bytes),
}

/// A template and factory for a typed error raised by a [ParserEntry::Raise]
/// entry. The factory receives the request context and response so the
/// message can reference both.
pub struct ErrorDescriptor {
    pub template: String,
    pub factory: Arc<dyn Fn(&RequestContext, &RawResponse) -> Error + Send + Sync>,
}

impl fmt::Debug for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorDescriptor")
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl Clone for ErrorDescriptor {
    fn clone(&self) -> Self {
        Self {
            template: self.template.clone(),
            factory: self.factory.clone(),
        }
    }
}

/// One entry in a [ParserMap]: what to do with a response selected for a
/// given status (or the default).
#[derive(Clone)]
pub enum ParserEntry {
    /// Apply a callback that may itself fail, becoming `parser_failed`.
    Transform(Arc<dyn Fn(&RawResponse) -> Result<serde_json::Value, Error> + Send + Sync>),
    /// Yield [ParsedValue::Null] without invoking anything.
    Null,
    /// Raise a typed, user-defined error (`user_defined` kind).
    Raise(ErrorDescriptor),
}

impl fmt::Debug for ParserEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserEntry::Transform(_) => f.write_str("ParserEntry::Transform"),
            ParserEntry::Null => f.write_str("ParserEntry::Null"),
            ParserEntry::Raise(d) => f.debug_tuple("ParserEntry::Raise").field(d).finish(),
        }
    }
}

/// The parser configured for an endpoint: a status-keyed map plus an
/// optional default applied when no exact status match exists.
#[derive(Clone, Debug, Default)]
pub struct ParserMap {
    pub by_status: HashMap<u16, ParserEntry>,
    pub default: Option<ParserEntry>,
}

impl ParserMap {
    pub fn with_default(entry: ParserEntry) -> Self {
        Self {
            by_status: HashMap::new(),
            default: Some(entry),
        }
    }

    pub fn on_status(mut self, status: u16, entry: ParserEntry) -> Self {
        self.by_status.insert(status, entry);
        self
    }

    /// Selects the entry for `status`: exact match, then default, then none
    /// (meaning "return the raw response").
    fn select(&self, status: u16) -> Option<&ParserEntry> {
        self.by_status.get(&status).or(self.default.as_ref())
    }

    /// Applies the selected entry, or falls back to the raw response body
    /// if nothing is configured for `status`.
    pub fn apply(
        &self,
        ctx: &RequestContext,
        response: &RawResponse,
    ) -> Result<ParsedValue, Error> {
        match self.select(response.status) {
            None => Ok(ParsedValue::Raw(response.body.clone())),
            Some(ParserEntry::Null) => Ok(ParsedValue::Null),
            Some(ParserEntry::Transform(f)) => {
                f(response).map(ParsedValue::Json).map_err(|e| match e.kind() {
                    crate::error::ErrorKind::ParserFailed => e,
                    _ => Error::parser_failed(e),
                })
            }
            Some(ParserEntry::Raise(descriptor)) => Err((descriptor.factory)(ctx, response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectiveConfig;
    use crate::transport::Method;
    use std::collections::HashMap as StdHashMap;

    fn ctx() -> RequestContext {
        RequestContext::new(
            Method::Get,
            "/x",
            "https://example.com",
            StdHashMap::new(),
            EffectiveConfig::default(),
        )
    }

    fn response(status: u16, body: &'static str) -> RawResponse {
        RawResponse {
            status,
            headers: StdHashMap::new(),
            body: bytes::Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn exact_status_beats_default() {
        let map = ParserMap::with_default(ParserEntry::Transform(Arc::new(|r| {
            serde_json::from_slice(&r.body).map_err(Error::parser_failed)
        })))
        .on_status(404, ParserEntry::Null);
        let parsed = map.apply(&ctx(), &response(404, "ignored")).unwrap();
        assert!(matches!(parsed, ParsedValue::Null));
    }

    #[test]
    fn falls_back_to_default_then_raw() {
        let map = ParserMap::with_default(ParserEntry::Transform(Arc::new(|r| {
            serde_json::from_slice(&r.body).map_err(Error::parser_failed)
        })));
        let parsed = map.apply(&ctx(), &response(200, r#"{"ok":true}"#)).unwrap();
        assert!(matches!(parsed, ParsedValue::Json(_)));

        let empty = ParserMap::default();
        let parsed = empty.apply(&ctx(), &response(200, "raw body")).unwrap();
        assert!(matches!(parsed, ParsedValue::Raw(_)));
    }

    #[test]
    fn transform_failure_becomes_parser_failed() {
        let map = ParserMap::with_default(ParserEntry::Transform(Arc::new(|r| {
            serde_json::from_slice(&r.body).map_err(Error::parser_failed)
        })));
        let err = map.apply(&ctx(), &response(200, "not json")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ParserFailed);
    }

    #[test]
    fn raise_entry_invokes_factory_with_context() {
        let map = ParserMap::default().on_status(
            429,
            ParserEntry::Raise(ErrorDescriptor {
                template: "rate limited".to_string(),
                factory: Arc::new(|_ctx, resp| Error::user_defined(format!("status {}", resp.status))),
            }),
        );
        let err = map.apply(&ctx(), &response(429, "")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UserDefined);
    }
}
