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

//! The error type returned by the request pipeline.
//!
//! Mirrors the split the teacher crate uses for its own `Error`: a small
//! `kind` tag cheap to match on (used by `retry_on` and by override lookups),
//! plus a boxed `source` carrying the details. Leaf error types such as
//! [BadStatusError] and [NoReplayError] are recovered from the boxed source
//! with [Error::as_inner].

use std::fmt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The error kinds a request pipeline can terminate with.
///
/// These are exactly the error kinds from the request lifecycle: a failure
/// can be matched against a [crate::config::RetryConfig]'s `retry_on` set by
/// comparing against these variants (plus the status code, for
/// [ErrorKind::BadStatus]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The underlying transport failed (connect/timeout/reset/TLS).
    Transport,
    /// The response status was not in the effective success set.
    BadStatus,
    /// A user validator rejected the response.
    ValidatorFailed,
    /// A parser callback raised while transforming the response.
    ParserFailed,
    /// An error-kind-typed parser entry matched and raised a typed error.
    UserDefined,
    /// Retry attempts were consumed without success.
    RetryExhausted,
    /// Replay mode was active and no stored exchange matched the request.
    NoReplay,
    /// The overall request deadline elapsed.
    Timeout,
    /// The caller cancelled the in-flight request.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorKind::Transport => "the underlying transport failed",
            ErrorKind::BadStatus => "the response status was not in the success set",
            ErrorKind::ValidatorFailed => "a response validator rejected the response",
            ErrorKind::ParserFailed => "the response parser raised an error",
            ErrorKind::UserDefined => "a user-defined parser error was raised",
            ErrorKind::RetryExhausted => "retry attempts were exhausted",
            ErrorKind::NoReplay => "no replay exchange matched the request",
            ErrorKind::Timeout => "the request deadline elapsed",
            ErrorKind::Cancelled => "the request was cancelled",
        };
        f.write_str(msg)
    }
}

/// The error type returned by [crate::pipeline::RequestPipeline::execute].
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: BoxError,
}

impl Error {
    /// Creates a new [Error] with the given kind and source.
    pub fn new<T: Into<BoxError>>(kind: ErrorKind, source: T) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn transport<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Transport, source)
    }

    pub fn bad_status(error: BadStatusError) -> Self {
        Self::new(ErrorKind::BadStatus, error)
    }

    pub fn validator_failed<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::ValidatorFailed, source)
    }

    pub fn parser_failed<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::ParserFailed, source)
    }

    pub fn user_defined<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::UserDefined, source)
    }

    pub fn retry_exhausted(last: Error) -> Self {
        Self::new(ErrorKind::RetryExhausted, last)
    }

    pub fn no_replay() -> Self {
        Self::new(ErrorKind::NoReplay, NoReplayError)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, TimeoutError)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, CancelledError)
    }

    pub fn other<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::ParserFailed, source)
    }

    /// Returns this error's [ErrorKind].
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the HTTP status carried by this error, if it wraps a
    /// [BadStatusError].
    pub fn status(&self) -> Option<u16> {
        self.as_inner::<BadStatusError>().map(|e| e.status)
    }

    /// Recurses through the source chain looking for a `T`.
    pub fn as_inner<T: std::error::Error + Send + Sync + 'static>(&self) -> Option<&T> {
        let mut error: &(dyn std::error::Error + 'static) = self.source.as_ref();
        loop {
            if let Some(found) = error.downcast_ref::<T>() {
                return Some(found);
            }
            error = error.source()?;
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.source)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// A response whose status was outside the effective success set.
#[derive(Debug, thiserror::Error)]
#[error("status {status} is not in the success set")]
pub struct BadStatusError {
    pub status: u16,
    pub body: bytes::Bytes,
}

#[derive(Debug, thiserror::Error)]
#[error("no replay exchange matched this request")]
pub struct NoReplayError;

#[derive(Debug, thiserror::Error)]
#[error("the request deadline elapsed")]
pub struct TimeoutError;

#[derive(Debug, thiserror::Error)]
#[error("the request was cancelled")]
pub struct CancelledError;

/// Alias for [std::result::Result] with [Error] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_status_round_trips_through_as_inner() {
        let err = Error::bad_status(BadStatusError {
            status: 503,
            body: bytes::Bytes::from_static(b"oops"),
        });
        assert_eq!(err.kind(), ErrorKind::BadStatus);
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn display_includes_kind_and_source() {
        let err = Error::transport("connection reset".to_string());
        let msg = format!("{err}");
        assert!(msg.contains("transport"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn retry_exhausted_wraps_last_outcome() {
        let last = Error::bad_status(BadStatusError {
            status: 500,
            body: bytes::Bytes::new(),
        });
        let err = Error::retry_exhausted(last);
        assert_eq!(err.kind(), ErrorKind::RetryExhausted);
        assert_eq!(err.status(), Some(500));
    }
}
