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

//! Log templates and the placeholder substitution used to render them.
//!
//! There is no direct teacher analog (the teacher logs via `tracing` spans
//! and structured fields rather than user-authored templates), so this
//! module follows the pattern used throughout the teacher crate for small,
//! cheaply-cloned config values: a `String` template plus a `render`
//! function, with `tracing` emitting the rendered line at the configured
//! level.

use std::collections::HashMap;
use std::fmt::Write as _;

/// The level a rendered [LogEvent] is emitted at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// A user-authored log line template, rendered with placeholders from the
/// vocabulary in spec.md section 6: `{URL}`, `{UURL}`, `{ENDPOINT}`,
/// `{UENDPOINT}`, `{METHOD}`, `{STATUS}`, `{ELAPSED}`, `{REPLAY}`,
/// `{IS_REPLAY}`, `{RETRY_DELAY}`, `{RETRY_CAUSE}`, `{CUR_ATTEMPT}`,
/// `{MAX_ATTEMPT}`, `{THROTTLE_LIMIT}`, `{THROTTLE_TIME}`,
/// `{THROTTLE_TIME_RANGE}`.
#[derive(Clone, Debug)]
pub struct LogEvent {
    pub template: String,
    pub level: LogLevel,
}

impl LogEvent {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            level: LogLevel::default(),
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Renders the template against a set of field values. Placeholders not
    /// present in `fields` are left literal rather than causing an error,
    /// per spec.md section 6's tolerance requirement.
    pub fn render(&self, fields: &HashMap<&str, String>) -> String {
        let mut out = String::with_capacity(self.template.len());
        let bytes = self.template.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                if let Some(end) = self.template[i..].find('}') {
                    let key = &self.template[i + 1..i + end];
                    if let Some(value) = fields.get(key) {
                        out.push_str(value);
                        i += end + 1;
                        continue;
                    }
                }
            }
            let ch = self.template[i..].chars().next().unwrap();
            let _ = write!(out, "{ch}");
            i += ch.len_utf8();
        }
        out
    }

    /// Emits this event at its configured level via `tracing`.
    pub fn emit(&self, fields: &HashMap<&str, String>) {
        let rendered = self.render(fields);
        match self.level {
            LogLevel::Trace => tracing::trace!("{rendered}"),
            LogLevel::Debug => tracing::debug!("{rendered}"),
            LogLevel::Info => tracing::info!("{rendered}"),
            LogLevel::Warn => tracing::warn!("{rendered}"),
            LogLevel::Error => tracing::error!("{rendered}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_placeholders() {
        let event = LogEvent::new("{METHOD} {URL} -> {STATUS}");
        let mut fields = HashMap::new();
        fields.insert("METHOD", "GET".to_string());
        fields.insert("URL", "https://example.com/x".to_string());
        fields.insert("STATUS", "200".to_string());
        assert_eq!(event.render(&fields), "GET https://example.com/x -> 200");
    }

    #[test]
    fn leaves_unknown_placeholders_literal() {
        let event = LogEvent::new("retrying in {RETRY_DELAY}, cause={NOT_A_FIELD}");
        let mut fields = HashMap::new();
        fields.insert("RETRY_DELAY", "1s".to_string());
        assert_eq!(
            event.render(&fields),
            "retrying in 1s, cause={NOT_A_FIELD}"
        );
    }

    #[test]
    fn template_without_placeholders_passes_through() {
        let event = LogEvent::new("request started");
        assert_eq!(event.render(&HashMap::new()), "request started");
    }
}
