//! Ordered, user-visible log of one step execution.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};

use crate::actor::{ActorRequest, ActorResponse};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogContent {
    Text {
        message: String,
    },
    CodeBlock {
        description: Option<String>,
        content: String,
    },
    Screenshot {
        mime_type: String,
        /// Base64 encoded image data
        data: String,
    },
    HttpRequest {
        request_line: String,
        headers: Vec<(String, String)>,
        body: Option<String>,
    },
    HttpResponse {
        status: u16,
        headers: Vec<(String, String)>,
        body: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub content: LogContent,
}

/// Append-only step log shared by the executor, the browser and all actors
/// of a step. Entries are mirrored to `tracing`.
#[derive(Debug, Clone)]
pub struct StepLogger {
    test_id: Arc<str>,
    step: Arc<str>,
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl StepLogger {
    pub fn new(test_id: &str, step: &str) -> Self {
        Self {
            test_id: Arc::from(test_id),
            step: Arc::from(step),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(test_id = %self.test_id, step = %self.step, "{}", message);
        self.push(LogContent::Text { message });
    }

    pub fn log_error(&self, message: &str, error: &dyn Display) {
        tracing::warn!(test_id = %self.test_id, step = %self.step, "{}: {}", message, error);
        self.push(LogContent::Text {
            message: format!("{message}: {error}"),
        });
    }

    pub fn log_code_block(&self, description: &str, content: impl Into<String>) {
        let content = content.into();
        tracing::debug!(test_id = %self.test_id, step = %self.step, "{}\n{}", description, content);
        self.push(LogContent::CodeBlock {
            description: Some(description.to_string()),
            content,
        });
    }

    pub fn log_screenshot(&self, image: &[u8], mime_type: &str) {
        tracing::debug!(test_id = %self.test_id, step = %self.step, "Screenshot ({} bytes)", image.len());
        self.push(LogContent::Screenshot {
            mime_type: mime_type.to_string(),
            data: STANDARD.encode(image),
        });
    }

    pub fn log_http_request(&self, request: &ActorRequest) {
        let request_line = format!("{} {}", request.method, request.uri());
        tracing::debug!(test_id = %self.test_id, step = %self.step, "HTTP request: {}", request_line);
        self.push(LogContent::HttpRequest {
            request_line,
            headers: header_pairs(&request.headers),
            body: body_text(&request.body),
        });
    }

    pub fn log_http_response(&self, response: &ActorResponse) {
        tracing::debug!(test_id = %self.test_id, step = %self.step, "HTTP response: {}", response.status);
        self.push(LogContent::HttpResponse {
            status: response.status.as_u16(),
            headers: header_pairs(&response.headers),
            body: body_text(&response.body),
        });
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, content: LogContent) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // Timestamps are taken under the lock and never go backwards
        let now = Utc::now();
        let timestamp = match entries.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        entries.push(LogEntry { timestamp, content });
    }
}

fn header_pairs(headers: &http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn body_text(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(body).into_owned())
    }
}
