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

//! Orchestrates config, concurrency, throttling, hooks, the retry loop,
//! validation, parsing, replay, and metrics for one request.
//!
//! Grounded in the teacher's `ReqwestClient::execute`/`retry_loop` split
//! (`http_client/mod.rs`): acquire resources, loop attempts through a
//! policy-driven decision, dispatch side effects around the loop rather
//! than inside it.

use crate::concurrency::ConcurrencyGate;
use crate::context::RequestContext;
use crate::error::{BadStatusError, Error};
use crate::hooks::{HookDispatcher, Outcome, RetryState};
use crate::metrics::{MetricsCollector, OutcomeBucket, Recording};
use crate::parse::ParsedValue;
use crate::replay::{load_or_no_replay, Exchange, Fingerprint, ReplayStore};
use crate::retry::{LoopState, RetryEngine};
use crate::throttle::ThrottleController;
use crate::transport::{RawResponse, Transport, TransportRequest};
use crate::validate::run_validators;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

/// Whether replay is active, and if so which way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReplayMode {
    #[default]
    Live,
    Record,
    Replay,
}

/// The shared coordination primitives a [RequestPipeline] draws on. Built
/// once per [crate::client::ClientRoot] and shared across every request.
pub struct PipelineResources {
    pub transport: Arc<dyn Transport>,
    pub concurrency: Arc<ConcurrencyGate>,
    pub throttle: Option<Arc<ThrottleController>>,
    pub hooks: Arc<HookDispatcher>,
    pub metrics: Arc<MetricsCollector>,
    pub replay_store: Option<Arc<dyn ReplayStore>>,
    pub replay_mode: ReplayMode,
}

/// A single request's execution, bound to a [RequestContext] and the
/// resources it needs.
pub struct RequestPipeline<'a> {
    resources: &'a PipelineResources,
}

impl<'a> RequestPipeline<'a> {
    pub fn new(resources: &'a PipelineResources) -> Self {
        Self { resources }
    }

    /// Runs the full request lifecycle (spec.md 4.1) and returns the parsed
    /// value or a terminal [Error].
    pub async fn execute(
        &self,
        ctx: RequestContext,
        body: Option<bytes::Bytes>,
    ) -> Result<ParsedValue, Error> {
        let started = Instant::now();
        let concurrency_policy = ctx.config.concurrent_requests.clone();
        let _permit = match &concurrency_policy {
            Some(policy) => Some(
                self.resources
                    .concurrency
                    .acquire(&ctx.endpoint_template, policy)
                    .await,
            ),
            None => None,
        };

        self.resources.hooks.before(&ctx).await;

        let mut retried = false;
        let mut throttled_flag = false;
        let attempt_loop = self.attempt_loop(&ctx, body, &mut retried, &mut throttled_flag);
        let result = match ctx.config.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, attempt_loop).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout()),
            },
            None => attempt_loop.await,
        };

        let (bucket, counted_as_success) = match &result {
            Ok((_, status)) => (OutcomeBucket::from_status(*status), ctx.config.success_set().contains(*status)),
            Err(err) => match err.status() {
                Some(status) => (OutcomeBucket::from_status(status), false),
                None => (OutcomeBucket::Aborted, false),
            },
        };

        match &result {
            Ok((value, status)) => {
                let response = RawResponse {
                    status: *status,
                    headers: Default::default(),
                    body: match value {
                        ParsedValue::Raw(b) => b.clone(),
                        _ => bytes::Bytes::new(),
                    },
                };
                self.resources
                    .hooks
                    .after(&ctx, Outcome::Response(&response), None)
                    .await;
            }
            Err(err) => {
                self.resources.hooks.after(&ctx, Outcome::Error(err), None).await;
            }
        }

        self.resources.metrics.record(
            ctx.metrics_key(),
            Recording {
                bucket,
                counted_as_success,
                elapsed: started.elapsed(),
                retried,
                throttled: throttled_flag,
                replayed: matches!(self.resources.replay_mode, ReplayMode::Replay),
            },
        );

        result.map(|(value, _)| value)
    }

    async fn attempt_loop(
        &self,
        ctx: &RequestContext,
        body: Option<bytes::Bytes>,
        retried: &mut bool,
        throttled_flag: &mut bool,
    ) -> Result<(ParsedValue, u16), Error> {
        let mut engine = ctx.config.retry.clone().map(RetryEngine::new);
        let mut rng = rand::rng();
        let mut exhausted_logged = false;

        loop {
            if let Some(throttle) = &self.resources.throttle {
                *throttled_flag = true;
                throttle.await_admission(&ctx.formatted_url).await;
            }

            let outcome = self.dispatch_once(ctx, body.clone()).await;

            match outcome {
                Ok(response) => {
                    if ctx.config.success_set().contains(response.status) {
                        let status = response.status;
                        return self.finish(ctx, response).map(|v| (v, status));
                    }
                    let error = Error::bad_status(BadStatusError {
                        status: response.status,
                        body: response.body.clone(),
                    });
                    let Some(eng) = engine.as_mut() else {
                        return Err(error);
                    };
                    match eng.on_failure(error, &mut rng) {
                        LoopState::Permanent(err) => return Err(err),
                        LoopState::Exhausted(err) => {
                            return self.on_exhausted(ctx, eng, &response, err, &mut exhausted_logged);
                        }
                        LoopState::Continue { delay, .. } => {
                            *retried = true;
                            let retry_state = RetryState {
                                attempt: eng.attempt_count(),
                                max_attempts: eng.max_attempts(),
                                delay,
                            };
                            self.resources
                                .hooks
                                .after(ctx, Outcome::Response(&response), Some(&retry_state))
                                .await;
                            self.emit_before_retry(eng, delay);
                            tokio::time::sleep(delay).await;
                            eng.advance();
                            self.emit_after_retry(eng, delay);
                        }
                    }
                }
                Err(error) => {
                    let Some(eng) = engine.as_mut() else {
                        return Err(error);
                    };
                    match eng.on_failure(error, &mut rng) {
                        LoopState::Permanent(err) => return Err(err),
                        LoopState::Exhausted(err) => return Err(crate::retry::exhausted_error(err)),
                        LoopState::Continue { error, delay } => {
                            *retried = true;
                            let retry_state = RetryState {
                                attempt: eng.attempt_count(),
                                max_attempts: eng.max_attempts(),
                                delay,
                            };
                            self.resources
                                .hooks
                                .after(ctx, Outcome::Error(&error), Some(&retry_state))
                                .await;
                            self.emit_before_retry(eng, delay);
                            tokio::time::sleep(delay).await;
                            eng.advance();
                            self.emit_after_retry(eng, delay);
                        }
                    }
                }
            }
        }
    }

    fn emit_before_retry(&self, engine: &RetryEngine, delay: std::time::Duration) {
        if let Some(event) = engine.config_log_before_retry() {
            event.emit(&retry_log_fields(engine, delay));
        }
    }

    fn emit_after_retry(&self, engine: &RetryEngine, delay: std::time::Duration) {
        if let Some(event) = engine.config_log_after_retry() {
            event.emit(&retry_log_fields(engine, delay));
        }
    }

    /// Applies `behavior = pass`/`break` once retries are exhausted.
    fn on_exhausted(
        &self,
        ctx: &RequestContext,
        engine: &RetryEngine,
        last_response: &RawResponse,
        error: Error,
        exhausted_logged: &mut bool,
    ) -> Result<(ParsedValue, u16), Error> {
        if !*exhausted_logged {
            *exhausted_logged = true;
            if let Some(event) = engine.config_log_exhausted() {
                event.emit(&std::collections::HashMap::new());
            }
        }
        if engine.behavior() == crate::retry::RetryBehavior::Pass
            && error.kind() != crate::error::ErrorKind::Transport
        {
            let status = last_response.status;
            return self.finish(ctx, last_response.clone()).map(|v| (v, status));
        }
        Err(crate::retry::exhausted_error(error))
    }

    fn finish(&self, ctx: &RequestContext, response: RawResponse) -> Result<ParsedValue, Error> {
        run_validators(&ctx.config.validators, ctx, &response)?;
        match &ctx.config.parser {
            Some(parser) => parser.apply(ctx, &response),
            None => Ok(ParsedValue::Raw(response.body)),
        }
    }

    async fn dispatch_once(
        &self,
        ctx: &RequestContext,
        body: Option<bytes::Bytes>,
    ) -> Result<RawResponse, Error> {
        if matches!(self.resources.replay_mode, ReplayMode::Replay) {
            let store = self
                .resources
                .replay_store
                .as_ref()
                .expect("replay mode requires a replay store");
            let fingerprint = Fingerprint::compute(
                ctx.method,
                &ctx.formatted_url,
                Vec::new(),
                body.as_deref().unwrap_or(&[]),
                &[],
            );
            return load_or_no_replay(store.as_ref(), &fingerprint, |status| {
                ctx.config.success_set().contains(status)
            })
            .await;
        }

        let mut request = TransportRequest::new(ctx.method, ctx.formatted_url.clone());
        request.body = body.clone();
        request.headers = ctx.headers.clone();
        request.query = ctx.query.clone();

        let send = self.resources.transport.send(request);
        let response = match ctx.config.attempt_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, send).await {
                Ok(sent) => sent.map_err(Error::transport)?,
                Err(_) => return Err(Error::timeout()),
            },
            None => send.await.map_err(Error::transport)?,
        };

        if matches!(self.resources.replay_mode, ReplayMode::Record) {
            if let Some(store) = &self.resources.replay_store {
                let fingerprint = Fingerprint::compute(
                    ctx.method,
                    &ctx.formatted_url,
                    Vec::new(),
                    body.as_deref().unwrap_or(&[]),
                    &[],
                );
                store
                    .record(Exchange {
                        fingerprint,
                        method: ctx.method,
                        url: ctx.formatted_url.clone(),
                        request_headers: Default::default(),
                        request_body: body.unwrap_or_default(),
                        response: response.clone(),
                        recorded_at: SystemTime::now(),
                        discard_on_bad_status: false,
                    })
                    .await;
            }
        }

        Ok(response)
    }
}

fn retry_log_fields(engine: &RetryEngine, delay: std::time::Duration) -> std::collections::HashMap<&'static str, String> {
    let mut fields = std::collections::HashMap::new();
    fields.insert("RETRY_DELAY", format!("{:?}", delay));
    fields.insert("CUR_ATTEMPT", engine.attempt_count().to_string());
    fields.insert("MAX_ATTEMPT", engine.max_attempts().to_string());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::ConcurrencyGate;
    use crate::config::EffectiveConfig;
    use crate::hooks::HookDispatcher;
    use crate::metrics::{MetricsCollector, OutcomeBucket};
    use crate::replay::InMemoryReplayStore;
    use crate::retry::RetryConfig;
    use crate::transport::{Method, TransportError, TransportRequest};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug)]
    struct ScriptedTransport {
        responses: StdMutex<VecDeque<Result<RawResponse, TransportError>>>,
        calls: std::sync::atomic::AtomicU32,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<RawResponse, TransportError>>) -> Self {
            Self {
                responses: StdMutex::new(responses.into()),
                calls: std::sync::atomic::AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: TransportRequest) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more times than scripted")
        }
    }

    fn ok_response(status: u16) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status,
            headers: HashMap::new(),
            body: bytes::Bytes::from_static(b"{}"),
        })
    }

    fn resources(transport: Arc<dyn Transport>) -> PipelineResources {
        PipelineResources {
            transport,
            concurrency: Arc::new(ConcurrencyGate::new()),
            throttle: None,
            hooks: Arc::new(HookDispatcher::new(vec![])),
            metrics: Arc::new(MetricsCollector::new()),
            replay_store: None,
            replay_mode: ReplayMode::Live,
        }
    }

    fn ctx(config: EffectiveConfig) -> RequestContext {
        RequestContext::new(Method::Get, "/x", "https://example.com", HashMap::new(), config)
    }

    #[tokio::test]
    async fn immediate_success_returns_parsed_value_in_one_call() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok_response(200)]));
        let resources = resources(transport.clone());
        let pipeline = RequestPipeline::new(&resources);
        let result = pipeline.execute(ctx(EffectiveConfig::default()), None).await;
        assert!(matches!(result, Ok(ParsedValue::Raw(_))));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn retries_server_error_then_succeeds() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok_response(500),
            ok_response(500),
            ok_response(200),
        ]));
        let resources = resources(transport.clone());
        let pipeline = RequestPipeline::new(&resources);
        let mut config = EffectiveConfig::default();
        config.retry = Some(RetryConfig::retry_server_errors());
        let result = pipeline.execute(ctx(config), None).await;
        assert!(result.is_ok());
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_break_into_retry_exhausted_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok_response(500),
            ok_response(500),
            ok_response(500),
        ]));
        let resources = resources(transport.clone());
        let pipeline = RequestPipeline::new(&resources);
        let mut config = EffectiveConfig::default();
        config.retry = Some(RetryConfig::retry_server_errors());
        let err = pipeline.execute(ctx(config), None).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RetryExhausted);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_with_pass_behavior_returns_last_response() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok_response(500),
            ok_response(500),
            ok_response(500),
        ]));
        let resources = resources(transport.clone());
        let pipeline = RequestPipeline::new(&resources);
        let mut retry = RetryConfig::retry_server_errors();
        retry.behavior = crate::retry::RetryBehavior::Pass;
        let mut config = EffectiveConfig::default();
        config.retry = Some(retry);
        let result = pipeline.execute(ctx(config), None).await;
        assert!(matches!(result, Ok(ParsedValue::Raw(_))));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn allowed_status_counts_as_success_without_retry() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok_response(404)]));
        let resources = resources(transport.clone());
        let pipeline = RequestPipeline::new(&resources);
        let mut config = EffectiveConfig::default();
        config.allowed_status_code = Some(crate::config::StatusSet::from(404));
        let key = ctx(config.clone()).metrics_key();
        let result = pipeline.execute(ctx(config), None).await;
        assert!(result.is_ok());
        let report = resources.metrics.report(&key).unwrap();
        assert_eq!(report.success_rate, 1.0);
    }

    #[tokio::test]
    async fn replay_mode_short_circuits_transport() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let store = Arc::new(InMemoryReplayStore::new());
        let fingerprint = Fingerprint::compute(
            Method::Get,
            "https://example.com/x",
            Vec::new(),
            &[],
            &[],
        );
        store
            .record(Exchange {
                fingerprint,
                method: Method::Get,
                url: "https://example.com/x".to_string(),
                request_headers: HashMap::new(),
                request_body: bytes::Bytes::new(),
                response: RawResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: bytes::Bytes::from_static(b"{}"),
                },
                recorded_at: SystemTime::now(),
                discard_on_bad_status: false,
            })
            .await;
        let mut resources = resources(transport.clone());
        resources.replay_store = Some(store);
        resources.replay_mode = ReplayMode::Replay;
        let pipeline = RequestPipeline::new(&resources);
        let result = pipeline.execute(ctx(EffectiveConfig::default()), None).await;
        assert!(result.is_ok());
        assert_eq!(transport.calls(), 0);
    }

    #[derive(Debug, Default)]
    struct RetryObservingHook {
        seen: StdMutex<Vec<Option<(u32, u32)>>>,
    }

    #[async_trait]
    impl crate::hooks::Hook for RetryObservingHook {
        async fn after(&self, _ctx: &RequestContext, _outcome: Outcome<'_>, retry_state: Option<&RetryState>) {
            self.seen
                .lock()
                .unwrap()
                .push(retry_state.map(|r| (r.attempt, r.max_attempts)));
        }
    }

    #[tokio::test]
    async fn hooks_fire_once_per_retry_attempt_with_retry_state() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok_response(500),
            ok_response(500),
            ok_response(200),
        ]));
        let hook = Arc::new(RetryObservingHook::default());
        let mut resources = resources(transport.clone());
        resources.hooks = Arc::new(HookDispatcher::new(vec![hook.clone()]));
        let pipeline = RequestPipeline::new(&resources);
        let mut config = EffectiveConfig::default();
        config.retry = Some(RetryConfig::retry_server_errors());
        let result = pipeline.execute(ctx(config), None).await;
        assert!(result.is_ok());

        let seen = hook.seen.lock().unwrap();
        // One `after` dispatch per retried attempt (carrying `Some(retry_state)`),
        // plus the final pipeline-exit `after` (carrying `None`).
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], Some((1, 3)));
        assert_eq!(seen[1], Some((2, 3)));
        assert_eq!(seen[2], None);
    }

    #[derive(Debug)]
    struct SlowTransport {
        delay: std::time::Duration,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, _request: TransportRequest) -> Result<RawResponse, TransportError> {
            tokio::time::sleep(self.delay).await;
            Ok(RawResponse {
                status: 200,
                headers: HashMap::new(),
                body: bytes::Bytes::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overall_timeout_bounds_total_execute_duration() {
        let transport = Arc::new(SlowTransport {
            delay: std::time::Duration::from_secs(5),
        });
        let resources = resources(transport);
        let pipeline = RequestPipeline::new(&resources);
        let mut config = EffectiveConfig::default();
        config.timeout = Some(std::time::Duration::from_secs(1));
        let err = pipeline.execute(ctx(config), None).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_bounds_a_single_dispatch() {
        let transport = Arc::new(SlowTransport {
            delay: std::time::Duration::from_secs(5),
        });
        let resources = resources(transport);
        let pipeline = RequestPipeline::new(&resources);
        let mut config = EffectiveConfig::default();
        config.attempt_timeout = Some(std::time::Duration::from_secs(1));
        let err = pipeline.execute(ctx(config), None).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn dispatch_forwards_query_and_headers_to_transport() {
        #[derive(Debug, Default)]
        struct RecordingTransport {
            seen: StdMutex<Option<TransportRequest>>,
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
        let resources = resources(transport.clone());
        let pipeline = RequestPipeline::new(&resources);
        let context = ctx(EffectiveConfig::default())
            .with_query(vec![("q".to_string(), "1".to_string())])
            .with_headers(HashMap::from([("X-Test".to_string(), "v".to_string())]));
        pipeline.execute(context, None).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        let request = seen.as_ref().unwrap();
        assert_eq!(request.query, vec![("q".to_string(), "1".to_string())]);
        assert_eq!(request.headers.get("X-Test"), Some(&"v".to_string()));
    }

    #[tokio::test]
    async fn transport_error_buckets_as_aborted_when_unretried() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(TransportError::new(
            "connection reset",
        ))]));
        let resources = resources(transport.clone());
        let pipeline = RequestPipeline::new(&resources);
        let key = ctx(EffectiveConfig::default()).metrics_key();
        let err = pipeline
            .execute(ctx(EffectiveConfig::default()), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
        let report = resources.metrics.report(&key).unwrap();
        assert_eq!(report.success_rate, 0.0);
        let _ = OutcomeBucket::Aborted;
    }

    mockall::mock! {
        #[derive(Debug)]
        RecordedTransport {}

        #[async_trait]
        impl Transport for RecordedTransport {
            async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
        }
    }

    #[tokio::test]
    async fn mocked_transport_sees_exactly_one_call_on_success() -> anyhow::Result<()> {
        use pretty_assertions::assert_eq;

        let mut mock = MockRecordedTransport::new();
        mock.expect_send()
            .once()
            .withf(|request| request.url == "https://example.com/x")
            .returning(|_| {
                Ok(RawResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: bytes::Bytes::from_static(b"{}"),
                })
            });

        let resources = resources(Arc::new(mock));
        let pipeline = RequestPipeline::new(&resources);
        let result = pipeline.execute(ctx(EffectiveConfig::default()), None).await?;
        let ParsedValue::Raw(body) = result else {
            anyhow::bail!("expected a raw body, got {result:?}");
        };
        assert_eq!(body, bytes::Bytes::from_static(b"{}"));
        Ok(())
    }
}
