//! Response buffering for handler chains.
//!
//! # Responsibilities
//! - Hold the status, headers and body a handler chain writes
//! - Commit status and headers exactly once, on the first write
//! - Run the status observer, header hook and body transform
//! - Turn the buffered result into an axum `Response`
//!
//! # Design Decisions
//! - `write_header` only records the status; nothing is committed until a
//!   body write or `write_header_now`
//! - Headers set after the commit are ignored, mirroring a wire writer
//!   that has already sent them

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

/// Observes (and may rewrite) the status when headers are committed.
pub type StatusHook = Box<dyn FnMut(StatusCode) -> StatusCode + Send>;
/// Runs against the headers right before they are committed.
pub type HeaderHook = Box<dyn FnMut(&mut HeaderMap) + Send>;
/// Transforms every chunk passed to `write`.
pub type BodyHook = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Buffered response writer handed to every handler through the context.
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    /// `None` until headers are committed.
    size: Option<usize>,
    status_hook: Option<StatusHook>,
    header_hook: Option<HeaderHook>,
    body_hook: Option<BodyHook>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            size: None,
            status_hook: None,
            header_hook: None,
            body_hook: None,
        }
    }

    pub fn with_status_hook(mut self, hook: StatusHook) -> Self {
        self.status_hook = Some(hook);
        self
    }

    pub fn with_header_hook(mut self, hook: HeaderHook) -> Self {
        self.header_hook = Some(hook);
        self
    }

    pub fn with_body_hook(mut self, hook: BodyHook) -> Self {
        self.body_hook = Some(hook);
        self
    }

    /// True once status and headers have been committed.
    pub fn written(&self) -> bool {
        self.size.is_some()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Bytes written so far, `None` before the commit.
    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Record the status to send. Has no effect after the commit.
    pub fn write_header(&mut self, status: StatusCode) {
        if !self.written() {
            self.status = status;
        }
    }

    /// Replace a header. Ignored after the commit.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.written() {
            self.headers.insert(name, value);
        }
    }

    /// Append a header. Ignored after the commit.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.written() {
            self.headers.append(name, value);
        }
    }

    /// Commit status and headers. Only the first call does anything.
    pub fn write_header_now(&mut self) {
        if self.written() {
            return;
        }
        self.size = Some(0);

        if let Some(hook) = self.header_hook.as_mut() {
            hook(&mut self.headers);
        }
        if let Some(hook) = self.status_hook.as_mut() {
            self.status = hook(self.status);
        }
    }

    /// Write body bytes, committing headers first if needed.
    /// Returns the number of bytes appended after the body transform.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.write_header_now();
        let written = match self.body_hook.as_mut() {
            Some(hook) => {
                let transformed = hook(data);
                self.body.extend_from_slice(&transformed);
                transformed.len()
            }
            None => {
                self.body.extend_from_slice(data);
                data.len()
            }
        };
        self.size = Some(self.size.unwrap_or(0) + written);
        written
    }

    /// Write a string without running the body transform.
    pub fn write_str(&mut self, data: &str) -> usize {
        self.write_header_now();
        self.body.extend_from_slice(data.as_bytes());
        self.size = Some(self.size.unwrap_or(0) + data.len());
        data.len()
    }

    /// Finish the response. Commits headers if no handler did.
    pub fn into_response(mut self) -> Response {
        self.write_header_now();
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("status", &self.status)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_status_then_body_commits_once() {
        let commits = Arc::new(AtomicUsize::new(0));
        let seen = commits.clone();
        let mut writer = ResponseWriter::new().with_status_hook(Box::new(move |status| {
            seen.fetch_add(1, Ordering::SeqCst);
            status
        }));

        writer.write_header(StatusCode::CREATED);
        assert!(!writer.written());
        writer.write(b"hello ");
        writer.write(b"world");
        writer.write_header(StatusCode::BAD_REQUEST);

        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(writer.status(), StatusCode::CREATED);
        assert_eq!(writer.body(), b"hello world");
        assert_eq!(writer.size(), Some(11));
    }

    #[test]
    fn test_body_transform_applied_to_each_write() {
        let mut writer = ResponseWriter::new()
            .with_body_hook(Box::new(|data: &[u8]| data.to_ascii_uppercase()));
        writer.write(b"abc");
        writer.write(b"def");
        assert_eq!(writer.body(), b"ABCDEF");
    }

    #[test]
    fn test_headers_frozen_after_commit() {
        let mut writer = ResponseWriter::new()
            .with_header_hook(Box::new(|headers: &mut HeaderMap| {
                headers.insert("x-served-by", HeaderValue::from_static("switchyard"));
            }));
        writer.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        writer.write_str("ok");
        writer.set_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = writer.into_response();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()["x-served-by"], "switchyard");
    }

    #[test]
    fn test_untouched_writer_yields_empty_ok() {
        let response = ResponseWriter::new().into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
