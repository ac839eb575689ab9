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

//! The immutable per-call descriptor threaded through hooks and logging.

use crate::config::EffectiveConfig;
use crate::transport::Method;
use std::collections::HashMap;

/// Substitutes `{NAME}`-style placeholders in an endpoint template.
///
/// Unknown placeholders are left literal, matching [crate::log_event]'s
/// tolerance rule; this keeps template substitution and log rendering
/// behaviorally consistent even though they serve different fields.
pub fn format_endpoint(template: &str, substitutions: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i..].find('}') {
                let key = &template[i + 1..i + end];
                if let Some(value) = substitutions.get(key) {
                    out.push_str(value);
                    i += end + 1;
                    continue;
                }
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// The immutable descriptor created when a call enters
/// [crate::pipeline::RequestPipeline::execute] and shared by reference
/// through hook dispatch; never mutated after construction.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: Method,
    pub endpoint_template: String,
    pub formatted_endpoint: String,
    pub formatted_url: String,
    pub substitutions: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub config: EffectiveConfig,
}

impl RequestContext {
    pub fn new(
        method: Method,
        endpoint_template: impl Into<String>,
        base_url: &str,
        substitutions: HashMap<String, String>,
        config: EffectiveConfig,
    ) -> Self {
        let endpoint_template = endpoint_template.into();
        let formatted_endpoint = format_endpoint(&endpoint_template, &substitutions);
        let formatted_url = format!("{base_url}{formatted_endpoint}");
        Self {
            method,
            endpoint_template,
            formatted_endpoint,
            formatted_url,
            substitutions,
            query: Vec::new(),
            headers: HashMap::new(),
            config,
        }
    }

    /// Attaches query parameters sent alongside the request (spec.md 165).
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Attaches request headers sent alongside the request (spec.md 165).
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// The `(method, unformatted_endpoint)` key [crate::metrics::MetricsCollector]
    /// aggregates under.
    pub fn metrics_key(&self) -> (Method, String) {
        (self.method, self.endpoint_template.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholders() {
        let mut subs = HashMap::new();
        subs.insert("NAME".to_string(), "pikachu".to_string());
        assert_eq!(format_endpoint("/pokemon/{NAME}", &subs), "/pokemon/pikachu");
    }

    #[test]
    fn leaves_unknown_placeholders_literal() {
        let subs = HashMap::new();
        assert_eq!(format_endpoint("/pokemon/{NAME}", &subs), "/pokemon/{NAME}");
    }

    #[test]
    fn context_formats_url_from_base_and_template() {
        let mut subs = HashMap::new();
        subs.insert("NAME".to_string(), "pikachu".to_string());
        let ctx = RequestContext::new(
            Method::Get,
            "/pokemon/{NAME}",
            "https://example.com",
            subs,
            EffectiveConfig::default(),
        );
        assert_eq!(ctx.formatted_url, "https://example.com/pokemon/pikachu");
        assert_eq!(ctx.endpoint_template, "/pokemon/{NAME}");
    }

    #[test]
    fn query_and_headers_default_empty_until_attached() {
        let ctx = RequestContext::new(
            Method::Get,
            "/x",
            "https://example.com",
            HashMap::new(),
            EffectiveConfig::default(),
        );
        assert!(ctx.query.is_empty());
        assert!(ctx.headers.is_empty());

        let ctx = ctx
            .with_query(vec![("q".to_string(), "1".to_string())])
            .with_headers(HashMap::from([("X-Test".to_string(), "v".to_string())]));
        assert_eq!(ctx.query, vec![("q".to_string(), "1".to_string())]);
        assert_eq!(ctx.headers.get("X-Test"), Some(&"v".to_string()));
    }
}
