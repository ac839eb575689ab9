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

//! The transport boundary: what the pipeline asks of raw HTTP I/O.
//!
//! Grounded in the teacher's `ReqwestClient`/`http_client` split, but
//! inverted: the teacher bakes `reqwest` directly into its client, while
//! this crate defines [Transport] as an object-safe trait (`async_trait`,
//! as the teacher uses for its `Credential` trait in `auth`) so that a
//! `ReplayStore` can stand in for it without the pipeline knowing the
//! difference. The concrete `reqwest`-backed implementation lives in the
//! sibling `transport-reqwest` crate.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

/// An HTTP method, as sent to the transport. A thin enum rather than
/// re-exporting `http::Method` so call sites read `Method::Get` the way
/// spec.md's verb methods do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-formed outgoing request, independent of any particular HTTP
/// client crate.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }
}

/// A raw HTTP response as seen by the pipeline, before parsing.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl RawResponse {
    /// Lazily-decoded JSON view of the body.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// An error from the transport layer itself: connect failure, timeout,
/// reset, TLS handshake failure. Distinct from [RawResponse] with a non-2xx
/// status, which is not a transport error.
#[derive(Debug, thiserror::Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The external collaborator that actually performs HTTP I/O.
///
/// One instance is shared across a client (see [crate::client::ClientRoot]);
/// implementations own their own connection pooling and TLS configuration.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_as_str_matches_http_verb() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Patch.as_str(), "PATCH");
    }

    #[test]
    fn json_decodes_body() {
        let response = RawResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from_static(br#"{"name":"pikachu"}"#),
        };
        let decoded: serde_json::Value = response.json().unwrap();
        assert_eq!(decoded["name"], "pikachu");
    }
}
