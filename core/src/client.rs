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

//! `ClientRoot`: the endpoint registry, config inheritance chain, and
//! shared transport/coordination primitives a caller talks to.
//!
//! Grounded in the teacher's `ReqwestClient`: one shared transport instance
//! built once, verb methods that thread per-call options down into
//! `execute`. This crate generalizes `execute`'s single built-in retry/JSON
//! contract into the full config-merge + pipeline described in spec.md 4.9.

use crate::concurrency::ConcurrencyGate;
use crate::config::{merge_chain, EffectiveConfig, GracefulConfig};
use crate::context::RequestContext;
use crate::error::Error;
use crate::hooks::{Hook, HookDispatcher};
use crate::metrics::MetricsCollector;
use crate::parse::ParsedValue;
use crate::pipeline::{PipelineResources, ReplayMode, RequestPipeline};
use crate::replay::ReplayStore;
use crate::throttle::ThrottleController;
use crate::transport::{Method, Transport};
use std::collections::HashMap;
use std::sync::Arc;

/// Registers per-endpoint config overrides, merged on top of the
/// client-level config at call time.
#[derive(Default)]
struct EndpointRegistry {
    overrides: HashMap<String, GracefulConfig>,
}

impl EndpointRegistry {
    fn chain_for<'a>(
        &'a self,
        root: &'a GracefulConfig,
        endpoint_template: &str,
    ) -> Vec<&'a GracefulConfig> {
        let mut chain = vec![root];
        if let Some(cfg) = self.overrides.get(endpoint_template) {
            chain.push(cfg);
        }
        chain
    }
}

/// Owns the shared transport, the client-level config, the per-endpoint
/// override registry, and every coordination primitive (concurrency,
/// throttle, hooks, metrics) that a [RequestPipeline] needs (spec.md 4.9).
pub struct ClientRoot {
    base_url: String,
    root_config: GracefulConfig,
    endpoints: EndpointRegistry,
    concurrency: Arc<ConcurrencyGate>,
    throttle: Option<Arc<ThrottleController>>,
    hooks: Arc<HookDispatcher>,
    metrics: Arc<MetricsCollector>,
    replay_store: Option<Arc<dyn ReplayStore>>,
    replay_mode: ReplayMode,
    transport: Arc<dyn Transport>,
}

/// Builds a [ClientRoot]. Mirrors the teacher's pattern of a plain
/// constructor taking a resolved config object rather than a fluent
/// builder, since every field here is either required or has an obvious
/// default.
pub struct ClientRootBuilder {
    base_url: String,
    transport: Arc<dyn Transport>,
    root_config: GracefulConfig,
    throttle_rules: Vec<crate::throttle::ThrottleRule>,
    hooks: Vec<Arc<dyn Hook>>,
    replay_store: Option<Arc<dyn ReplayStore>>,
    replay_mode: ReplayMode,
}

impl ClientRootBuilder {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
            root_config: GracefulConfig::default(),
            throttle_rules: Vec::new(),
            hooks: Vec::new(),
            replay_store: None,
            replay_mode: ReplayMode::Live,
        }
    }

    pub fn with_config(mut self, config: GracefulConfig) -> Self {
        self.root_config = config;
        self
    }

    pub fn with_throttle_rules(mut self, rules: Vec<crate::throttle::ThrottleRule>) -> Self {
        self.throttle_rules = rules;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_replay(mut self, store: Arc<dyn ReplayStore>, mode: ReplayMode) -> Self {
        self.replay_store = Some(store);
        self.replay_mode = mode;
        self
    }

    pub fn build(self) -> ClientRoot {
        let throttle = if self.throttle_rules.is_empty() {
            None
        } else {
            Some(Arc::new(ThrottleController::new(self.throttle_rules)))
        };
        ClientRoot {
            base_url: self.base_url,
            root_config: self.root_config,
            endpoints: EndpointRegistry::default(),
            concurrency: Arc::new(ConcurrencyGate::new()),
            throttle,
            hooks: Arc::new(HookDispatcher::new(self.hooks)),
            metrics: Arc::new(MetricsCollector::new()),
            replay_store: self.replay_store,
            replay_mode: self.replay_mode,
            transport: self.transport,
        }
    }
}

impl ClientRoot {
    pub fn builder(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> ClientRootBuilder {
        ClientRootBuilder::new(base_url, transport)
    }

    /// Registers a per-endpoint config override, merged on top of the
    /// root config for calls through that template.
    pub fn set_endpoint_override(&mut self, endpoint_template: impl Into<String>, config: GracefulConfig) {
        self.endpoints
            .overrides
            .insert(endpoint_template.into(), config);
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    fn effective_config(&self, endpoint_template: &str) -> EffectiveConfig {
        merge_chain(self.endpoints.chain_for(&self.root_config, endpoint_template))
    }

    fn resources(&self) -> PipelineResources {
        PipelineResources {
            transport: self.transport.clone(),
            concurrency: self.concurrency.clone(),
            throttle: self.throttle.clone(),
            hooks: self.hooks.clone(),
            metrics: self.metrics.clone(),
            replay_store: self.replay_store.clone(),
            replay_mode: self.replay_mode,
        }
    }

    /// Builds a context and runs it through the pipeline. The verb methods
    /// below are thin wrappers over this.
    #[allow(clippy::too_many_arguments)]
    async fn request(
        &self,
        method: Method,
        endpoint_template: &str,
        substitutions: HashMap<String, String>,
        query: Vec<(String, String)>,
        headers: HashMap<String, String>,
        body: Option<bytes::Bytes>,
    ) -> Result<ParsedValue, Error> {
        let config = self.effective_config(endpoint_template);
        let ctx = RequestContext::new(method, endpoint_template, &self.base_url, substitutions, config)
            .with_query(query)
            .with_headers(headers);
        let resources = self.resources();
        let span = tracing::info_span!("graceful_request", endpoint = endpoint_template, method = %method);
        let _entered = span.enter();
        RequestPipeline::new(&resources).execute(ctx, body).await
    }

    pub async fn get(
        &self,
        endpoint_template: &str,
        substitutions: HashMap<String, String>,
        query: Vec<(String, String)>,
        headers: HashMap<String, String>,
    ) -> Result<ParsedValue, Error> {
        self.request(Method::Get, endpoint_template, substitutions, query, headers, None)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn post(
        &self,
        endpoint_template: &str,
        substitutions: HashMap<String, String>,
        query: Vec<(String, String)>,
        body: Option<bytes::Bytes>,
        headers: HashMap<String, String>,
    ) -> Result<ParsedValue, Error> {
        self.request(Method::Post, endpoint_template, substitutions, query, headers, body)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn put(
        &self,
        endpoint_template: &str,
        substitutions: HashMap<String, String>,
        query: Vec<(String, String)>,
        body: Option<bytes::Bytes>,
        headers: HashMap<String, String>,
    ) -> Result<ParsedValue, Error> {
        self.request(Method::Put, endpoint_template, substitutions, query, headers, body)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn patch(
        &self,
        endpoint_template: &str,
        substitutions: HashMap<String, String>,
        query: Vec<(String, String)>,
        body: Option<bytes::Bytes>,
        headers: HashMap<String, String>,
    ) -> Result<ParsedValue, Error> {
        self.request(Method::Patch, endpoint_template, substitutions, query, headers, body)
            .await
    }

    pub async fn delete(
        &self,
        endpoint_template: &str,
        substitutions: HashMap<String, String>,
        query: Vec<(String, String)>,
        headers: HashMap<String, String>,
    ) -> Result<ParsedValue, Error> {
        self.request(Method::Delete, endpoint_template, substitutions, query, headers, None)
            .await
    }

    pub async fn head(
        &self,
        endpoint_template: &str,
        substitutions: HashMap<String, String>,
        query: Vec<(String, String)>,
        headers: HashMap<String, String>,
    ) -> Result<ParsedValue, Error> {
        self.request(Method::Head, endpoint_template, substitutions, query, headers, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RawResponse, TransportError, TransportRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct StaticTransport {
        status: u16,
        body: &'static str,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for StaticTransport {
        async fn send(&self, _request: TransportRequest) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawResponse {
                status: self.status,
                headers: HashMap::new(),
                body: bytes::Bytes::from_static(self.body.as_bytes()),
            })
        }
    }

    #[tokio::test]
    async fn get_returns_raw_body_with_no_parser_configured() {
        let transport = Arc::new(StaticTransport {
            status: 200,
            body: r#"{"name":"pikachu"}"#,
            calls: AtomicU32::new(0),
        });
        let client = ClientRoot::builder("https://example.com", transport.clone()).build();
        let mut subs = HashMap::new();
        subs.insert("NAME".to_string(), "pikachu".to_string());
        let result = client
            .get("/pokemon/{NAME}", subs, Vec::new(), HashMap::new())
            .await
            .unwrap();
        assert!(matches!(result, ParsedValue::Raw(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn endpoint_override_merges_on_top_of_root_config() {
        let transport = Arc::new(StaticTransport {
            status: 404,
            body: "",
            calls: AtomicU32::new(0),
        });
        let mut client = ClientRoot::builder("https://example.com", transport).build();
        client.set_endpoint_override(
            "/maybe-missing",
            GracefulConfig {
                allowed_status_code: crate::config::Setting::Set(crate::config::StatusSet::from(404)),
                ..Default::default()
            },
        );
        let result = client
            .get("/maybe-missing", HashMap::new(), Vec::new(), HashMap::new())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn query_and_headers_reach_the_transport() {
        #[derive(Debug, Default)]
        struct RecordingTransport {
            seen: std::sync::Mutex<Option<TransportRequest>>,
        }

        #[async_trait]
        impl Transport for RecordingTransport {
            async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
                *self.seen.lock().unwrap() = Some(request);
                Ok(RawResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: bytes::Bytes::new(),
                })
            }
        }

        let transport = Arc::new(RecordingTransport::default());
        let client = ClientRoot::builder("https://example.com", transport.clone()).build();
        client
            .get(
                "/x",
                HashMap::new(),
                vec![("q".to_string(), "1".to_string())],
                HashMap::from([("X-Test".to_string(), "v".to_string())]),
            )
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        let request = seen.as_ref().unwrap();
        assert_eq!(request.query, vec![("q".to_string(), "1".to_string())]);
        assert_eq!(request.headers.get("X-Test"), Some(&"v".to_string()));
    }
}
