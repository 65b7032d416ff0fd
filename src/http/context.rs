//! Per-request context and the handler-chain state machine.
//!
//! # Chain States
//! ```text
//! not started (cursor = -1)
//!     → next() → running (0 <= cursor < len)
//!         → completed (cursor == len)
//!         → aborted   (cursor = ABORT_INDEX, never resumes)
//! ```
//!
//! # Design Decisions
//! - The cursor only moves forward; `abort` jumps it past any real index
//! - `abort` never unwinds: handlers already on the stack run to completion
//! - A handler returning `Err` aborts the chain and the fault propagates
//!   out of every enclosing `next()` until something handles it

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app::AppContext;
use crate::http::chain::{Handler, HandlerChain};
use crate::http::fault::{Fault, HandlerResult};
use crate::http::params::{BindError, Values};
use crate::http::request::{ParsedRequest, UploadedFile};
use crate::http::response::ResponseWriter;
use crate::http::X_REQUEST_ID;

/// Cursor value of an aborted chain. Far above any realistic chain length.
pub const ABORT_INDEX: isize = isize::MAX / 2;

/// State of one in-flight request.
pub struct Context {
    app: Arc<AppContext>,
    request: Parts,
    query: Values,
    form: Values,
    params: Values,
    files: HashMap<String, Vec<UploadedFile>>,
    body: Bytes,
    writer: ResponseWriter,
    keys: HashMap<String, Box<dyn Any + Send + Sync>>,
    chain: HandlerChain,
    index: isize,
    internal_error: Option<Fault>,
}

impl Context {
    pub fn new(app: Arc<AppContext>, parsed: ParsedRequest, writer: ResponseWriter) -> Self {
        let params = parsed.merged_params();
        Self {
            app,
            request: parsed.parts,
            query: parsed.query,
            form: parsed.form,
            params,
            files: parsed.files,
            body: parsed.body,
            writer,
            keys: HashMap::new(),
            chain: HandlerChain::default(),
            index: -1,
            internal_error: None,
        }
    }

    /// Context for a bodiless request, query parsed from the URI.
    pub fn from_parts(app: Arc<AppContext>, parts: Parts) -> Self {
        let query = parts.uri.query().map(Values::parse).unwrap_or_default();
        let parsed = ParsedRequest {
            parts,
            query,
            form: Values::new(),
            files: HashMap::new(),
            body: Bytes::new(),
        };
        Self::new(app, parsed, ResponseWriter::new())
    }

    pub fn app(&self) -> &Arc<AppContext> {
        &self.app
    }

    // ---- chain control ----

    /// Assign the chain to run. Resets the cursor, so only the dispatcher
    /// calls it, before the chain starts.
    ///
    /// ```compile_fail
    /// use switchyard::http::chain::HandlerChain;
    /// use switchyard::Context;
    ///
    /// fn rewind(ctx: &mut Context) {
    ///     ctx.set_chain(HandlerChain::default());
    /// }
    /// ```
    pub(crate) fn set_chain(&mut self, chain: HandlerChain) {
        self.chain = chain;
        self.index = -1;
    }

    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    /// Run the rest of the chain.
    ///
    /// Called once by the dispatcher to start the chain, and by middleware to
    /// run everything downstream before doing its own post-processing.
    pub fn next(&mut self) -> HandlerResult {
        let chain = self.chain.clone();
        self.index += 1;
        while let Some(handler) = self.current(&chain) {
            if let Err(fault) = handler(&mut *self) {
                self.abort();
                return Err(fault);
            }
            self.index += 1;
        }
        Ok(())
    }

    fn current<'c>(&self, chain: &'c HandlerChain) -> Option<&'c Handler> {
        usize::try_from(self.index).ok().and_then(|i| chain.get(i))
    }

    /// Stop any handler that has not started yet from running.
    pub fn abort(&mut self) {
        self.index = ABORT_INDEX;
    }

    pub fn is_aborted(&self) -> bool {
        self.index >= ABORT_INDEX
    }

    /// Current cursor position (`-1` before the chain starts).
    pub fn cursor(&self) -> isize {
        self.index
    }

    pub fn abort_with_status(&mut self, status: StatusCode) {
        self.abort();
        self.status(status);
        self.writer.write_header_now();
    }

    pub fn abort_with_string(&mut self, status: StatusCode, data: &str) {
        self.abort();
        self.string(status, data);
    }

    pub fn abort_with_json<T: Serialize>(&mut self, status: StatusCode, data: &T) -> HandlerResult {
        self.abort();
        self.json(status, data)
    }

    // ---- request ----

    pub fn request(&self) -> &Parts {
        &self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn uri(&self) -> &Uri {
        &self.request.uri
    }

    pub fn path(&self) -> &str {
        self.request.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
    }

    /// Query-string parameters.
    pub fn query(&self) -> &Values {
        &self.query
    }

    /// Body parameters (POST/PUT/PATCH forms).
    pub fn form(&self) -> &Values {
        &self.form
    }

    /// Body parameters layered over query parameters.
    pub fn params(&self) -> &Values {
        &self.params
    }

    /// First merged value for `key`, empty when absent.
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).unwrap_or_default()
    }

    pub fn form_file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name).and_then(|files| files.first())
    }

    pub fn form_files(&self, name: &str) -> &[UploadedFile] {
        self.files.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Raw request body. Empty for multipart uploads.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn bind_query<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        self.query.bind()
    }

    pub fn bind_form<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        self.form.bind()
    }

    pub fn bind_params<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        self.params.bind()
    }

    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Method, URI, version and headers, one per line.
    pub fn dump_request(&self) -> String {
        let mut dump = format!(
            "{} {} {:?}\r\n",
            self.request.method, self.request.uri, self.request.version
        );
        for (name, value) in self.request.headers.iter() {
            dump.push_str(name.as_str());
            dump.push_str(": ");
            dump.push_str(value.to_str().unwrap_or("<binary>"));
            dump.push_str("\r\n");
        }
        dump
    }

    // ---- request-scoped values ----

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.keys.insert(key.into(), Box::new(value));
    }

    /// Value stored under `key`, if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.keys.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self, key: &str) -> Option<&mut T> {
        self.keys.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    // ---- internal error slot ----

    pub fn internal_error(&self) -> Option<&Fault> {
        self.internal_error.as_ref()
    }

    pub(crate) fn set_internal_error(&mut self, fault: Fault) {
        self.internal_error = Some(fault);
    }

    // ---- response ----

    pub fn writer(&self) -> &ResponseWriter {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut ResponseWriter {
        &mut self.writer
    }

    /// Record the response status; sent with the first body write.
    pub fn status(&mut self, status: StatusCode) {
        self.writer.write_header(status);
    }

    pub fn header(&mut self, name: &str, value: &str) -> HandlerResult {
        let name = HeaderName::try_from(name)?;
        let value = HeaderValue::try_from(value)?;
        self.writer.set_header(name, value);
        Ok(())
    }

    pub fn bytes(&mut self, status: StatusCode, data: &[u8]) {
        self.status(status);
        self.writer.write(data);
    }

    pub fn string(&mut self, status: StatusCode, data: &str) {
        self.default_content_type("text/plain; charset=UTF-8");
        self.bytes(status, data.as_bytes());
    }

    pub fn json<T: Serialize>(&mut self, status: StatusCode, data: &T) -> HandlerResult {
        let body = serde_json::to_vec(data)?;
        self.default_content_type("application/json; charset=UTF-8");
        self.bytes(status, &body);
        Ok(())
    }

    /// Render `template` inside `layout` with the application's renderer.
    pub fn render(
        &mut self,
        status: StatusCode,
        layout: &str,
        template: &str,
        data: &serde_json::Value,
    ) -> HandlerResult {
        let renderer = self
            .app
            .renderer()
            .ok_or_else(|| Fault::new("no template renderer configured"))?;
        let html = renderer.render(layout, template, data)?;
        self.default_content_type("text/html; charset=UTF-8");
        self.bytes(status, html.as_bytes());
        Ok(())
    }

    pub fn redirect(&mut self, status: StatusCode, location: &str) -> HandlerResult {
        let value = HeaderValue::try_from(location)?;
        self.writer.set_header(header::LOCATION, value);
        self.status(status);
        self.writer.write_header_now();
        Ok(())
    }

    fn default_content_type(&mut self, value: &'static str) {
        if !self.writer.headers().contains_key(header::CONTENT_TYPE) {
            self.writer
                .set_header(header::CONTENT_TYPE, HeaderValue::from_static(value));
        }
    }

    pub fn into_response(self) -> Response {
        self.writer.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppContext;
    use crate::http::chain::{handler, Handler};
    use axum::http::Request;
    use std::sync::Mutex;

    fn context(chain: Vec<Handler>) -> Context {
        let (parts, ()) = Request::builder()
            .uri("/x?a=1")
            .body(())
            .unwrap()
            .into_parts();
        let mut ctx = Context::from_parts(Arc::new(AppContext::default()), parts);
        ctx.set_chain(HandlerChain::new(chain));
        ctx
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Handler {
        let log = log.clone();
        handler(move |_| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = context(vec![recorder(&log, "a"), recorder(&log, "b"), recorder(&log, "c")]);
        assert_eq!(ctx.cursor(), -1);
        ctx.next().unwrap();
        assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
        assert_eq!(ctx.cursor(), 3);
        assert!(!ctx.is_aborted());
    }

    #[test]
    fn test_middleware_wraps_downstream() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer = {
            let log = log.clone();
            handler(move |ctx| {
                log.lock().unwrap().push("before");
                ctx.next()?;
                log.lock().unwrap().push("after");
                Ok(())
            })
        };
        let mut ctx = context(vec![outer, recorder(&log, "action")]);
        ctx.next().unwrap();
        assert_eq!(*log.lock().unwrap(), ["before", "action", "after"]);
    }

    #[test]
    fn test_abort_before_next_stops_later_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let guard = {
            let log = log.clone();
            handler(move |ctx| {
                ctx.abort();
                ctx.next()?;
                log.lock().unwrap().push("guard finished");
                Ok(())
            })
        };
        let mut ctx = context(vec![guard, recorder(&log, "never")]);
        ctx.next().unwrap();
        assert_eq!(*log.lock().unwrap(), ["guard finished"]);
        assert!(ctx.is_aborted());
    }

    #[test]
    fn test_abort_does_not_unwind_callers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer = {
            let log = log.clone();
            handler(move |ctx| {
                ctx.next()?;
                log.lock().unwrap().push("outer after");
                Ok(())
            })
        };
        let aborter = handler(|ctx| {
            ctx.abort_with_status(StatusCode::UNAUTHORIZED);
            Ok(())
        });
        let mut ctx = context(vec![outer, aborter, recorder(&log, "never")]);
        ctx.next().unwrap();
        assert_eq!(*log.lock().unwrap(), ["outer after"]);
        assert_eq!(ctx.writer().status(), StatusCode::UNAUTHORIZED);
        assert!(ctx.writer().written());
    }

    #[test]
    fn test_fault_stops_chain_and_propagates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing = handler(|_| Err(Fault::new("nope")));
        let mut ctx = context(vec![recorder(&log, "a"), failing, recorder(&log, "never")]);
        let err = ctx.next().unwrap_err();
        assert_eq!(err.message(), "nope");
        assert_eq!(*log.lock().unwrap(), ["a"]);
        assert!(ctx.is_aborted());
        assert!(ctx.next().is_ok());
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_key_value_bag() {
        let mut ctx = context(vec![]);
        ctx.set("user_id", 42_u64);
        ctx.set("name", String::from("ada"));
        assert_eq!(ctx.get::<u64>("user_id"), Some(&42));
        assert_eq!(ctx.get::<String>("name").map(String::as_str), Some("ada"));
        assert_eq!(ctx.get::<u32>("user_id"), None);
        assert!(!ctx.contains_key("missing"));
        *ctx.get_mut::<u64>("user_id").unwrap() += 1;
        assert_eq!(ctx.get::<u64>("user_id"), Some(&43));
    }

    #[test]
    fn test_output_helpers() {
        let mut ctx = context(vec![]);
        ctx.json(StatusCode::CREATED, &serde_json::json!({"ok": true})).unwrap();
        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=UTF-8"
        );

        let mut ctx = context(vec![]);
        ctx.redirect(StatusCode::FOUND, "/login").unwrap();
        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[test]
    fn test_params_and_dump() {
        let ctx = context(vec![]);
        assert_eq!(ctx.param("a"), "1");
        assert_eq!(ctx.param("b"), "");
        assert!(ctx.dump_request().starts_with("GET /x?a=1 HTTP/1.1"));
    }
}
