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

//! Record/replay: short-circuiting the transport with stored exchanges.
//!
//! No teacher analog exists (the teacher always talks to live GCP
//! endpoints); this module follows the crate's general shape for pluggable
//! external collaborators — an `async_trait` interface plus one in-memory
//! implementation for tests, the same pattern [crate::transport::Transport]
//! uses.

use crate::error::Error;
use crate::transport::{Method, RawResponse};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

/// A canonicalized request identity: method, URL, sorted query, body hash,
/// and a caller-selected subset of headers. Stable across record/replay
/// runs, per spec.md 4.6.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(
        method: Method,
        url: &str,
        mut query: Vec<(String, String)>,
        body: &[u8],
        selected_headers: &[(String, String)],
    ) -> Self {
        query.sort();
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(url.as_bytes());
        for (k, v) in &query {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"&");
        }
        hasher.update(body);
        let mut headers = selected_headers.to_vec();
        headers.sort();
        for (k, v) in &headers {
            hasher.update(k.as_bytes());
            hasher.update(b":");
            hasher.update(v.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }
}

/// A captured (request fingerprint, response) pair. The wire format
/// (spec.md 6) is normative across store implementations: method, URL,
/// filtered request headers, byte-exact request body, response status,
/// byte-exact response headers and body, and a record timestamp.
#[derive(Clone, Debug)]
pub struct Exchange {
    pub fingerprint: Fingerprint,
    pub method: Method,
    pub url: String,
    pub request_headers: HashMap<String, String>,
    pub request_body: bytes::Bytes,
    pub response: RawResponse,
    pub recorded_at: SystemTime,
    /// If true, [ReplayStore::load] treats this exchange as absent when its
    /// response status falls outside the configured success set.
    pub discard_on_bad_status: bool,
}

/// The indirection a replaying pipeline consults instead of the transport.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    async fn record(&self, exchange: Exchange);
    async fn load(&self, fingerprint: &Fingerprint) -> Option<Exchange>;
}

/// An in-memory [ReplayStore], sufficient for tests and short-lived record
/// sessions; a durable store (embedded SQL, document database) is an
/// external collaborator per spec.md 1.
#[derive(Default)]
pub struct InMemoryReplayStore {
    exchanges: Mutex<HashMap<Fingerprint, Exchange>>,
}

impl InMemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayStore for InMemoryReplayStore {
    async fn record(&self, exchange: Exchange) {
        self.exchanges
            .lock()
            .expect("replay store lock poisoned")
            .insert(exchange.fingerprint.clone(), exchange);
    }

    async fn load(&self, fingerprint: &Fingerprint) -> Option<Exchange> {
        self.exchanges
            .lock()
            .expect("replay store lock poisoned")
            .get(fingerprint)
            .cloned()
    }
}

/// Loads an exchange and applies the `discard_on_bad_status` rule,
/// returning `no_replay` when nothing usable is found.
pub async fn load_or_no_replay(
    store: &dyn ReplayStore,
    fingerprint: &Fingerprint,
    is_success: impl Fn(u16) -> bool,
) -> Result<RawResponse, Error> {
    let Some(exchange) = store.load(fingerprint).await else {
        return Err(Error::no_replay());
    };
    if exchange.discard_on_bad_status && !is_success(exchange.response.status) {
        return Err(Error::no_replay());
    }
    Ok(exchange.response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> RawResponse {
        RawResponse {
            status: 200,
            headers: HashMap::new(),
            body: bytes::Bytes::from_static(b"{}"),
        }
    }

    #[test]
    fn fingerprint_is_stable_across_query_order() {
        let a = Fingerprint::compute(
            Method::Get,
            "https://example.com/x",
            vec![("b".into(), "2".into()), ("a".into(), "1".into())],
            b"",
            &[],
        );
        let b = Fingerprint::compute(
            Method::Get,
            "https://example.com/x",
            vec![("a".into(), "1".into()), ("b".into(), "2".into())],
            b"",
            &[],
        );
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn record_then_replay_round_trips() {
        let store = InMemoryReplayStore::new();
        let fp = Fingerprint::compute(Method::Get, "https://example.com/x", vec![], b"", &[]);
        store
            .record(Exchange {
                fingerprint: fp.clone(),
                method: Method::Get,
                url: "https://example.com/x".to_string(),
                request_headers: HashMap::new(),
                request_body: bytes::Bytes::new(),
                response: sample_response(),
                recorded_at: SystemTime::now(),
                discard_on_bad_status: false,
            })
            .await;
        let loaded = load_or_no_replay(&store, &fp, |status| (200..300).contains(&status))
            .await
            .unwrap();
        assert_eq!(loaded.status, 200);
    }

    #[tokio::test]
    async fn missing_exchange_is_no_replay() {
        let store = InMemoryReplayStore::new();
        let fp = Fingerprint::compute(Method::Get, "https://example.com/missing", vec![], b"", &[]);
        let err = load_or_no_replay(&store, &fp, |status| (200..300).contains(&status))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NoReplay);
    }

    #[tokio::test]
    async fn discard_on_bad_status_treats_stored_error_as_no_replay() {
        let store = InMemoryReplayStore::new();
        let fp = Fingerprint::compute(Method::Get, "https://example.com/x", vec![], b"", &[]);
        let mut response = sample_response();
        response.status = 500;
        store
            .record(Exchange {
                fingerprint: fp.clone(),
                method: Method::Get,
                url: "https://example.com/x".to_string(),
                request_headers: HashMap::new(),
                request_body: bytes::Bytes::new(),
                response,
                recorded_at: SystemTime::now(),
                discard_on_bad_status: true,
            })
            .await;
        let err = load_or_no_replay(&store, &fp, |status| (200..300).contains(&status))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NoReplay);
    }
}
