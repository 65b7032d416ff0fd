//! Inbound request parsing.
//!
//! # Responsibilities
//! - Parse the query string
//! - Parse POST/PUT/PATCH bodies as multipart or URL-encoded forms
//! - Keep other bodies as raw bytes for the handlers
//! - Spill large uploaded files to temporary storage
//!
//! # Design Decisions
//! - Parsing happens before routing; a failure here ends the request
//! - Multipart data up to `max_multipart_memory` stays in memory, file
//!   contents past that budget go to temp files
//! - Text fields count against the memory budget plus a fixed 10 MiB slack,
//!   past which the upload is rejected

use std::collections::HashMap;
use std::io;
use std::path::Path;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, request::Parts, Method, Request};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::config::UploadConfig;
use crate::http::fault::Fault;
use crate::http::params::Values;

/// Extra allowance for non-file multipart values.
const TEXT_VALUE_SLACK: usize = 10 << 20;

/// Body limits applied while parsing.
#[derive(Debug, Clone)]
pub struct BodyLimits {
    pub max_multipart_memory: usize,
    pub max_form_size: usize,
    pub max_body_size: usize,
}

impl From<&UploadConfig> for BodyLimits {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_multipart_memory: config.max_multipart_memory,
            max_form_size: config.max_form_size,
            max_body_size: config.max_body_size,
        }
    }
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

/// Where an uploaded file's bytes live.
#[derive(Debug)]
pub enum FileStorage {
    Memory(Bytes),
    Disk(NamedTempFile),
}

/// A file part of a multipart upload.
#[derive(Debug)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
    pub storage: FileStorage,
}

impl UploadedFile {
    pub fn is_on_disk(&self) -> bool {
        matches!(self.storage, FileStorage::Disk(_))
    }

    /// Full contents, read from disk when spilled.
    pub fn bytes(&self) -> io::Result<Bytes> {
        match &self.storage {
            FileStorage::Memory(bytes) => Ok(bytes.clone()),
            FileStorage::Disk(file) => Ok(Bytes::from(std::fs::read(file.path())?)),
        }
    }

    /// Copy the upload to `dst`.
    pub fn save_to(&self, dst: impl AsRef<Path>) -> io::Result<()> {
        match &self.storage {
            FileStorage::Memory(bytes) => std::fs::write(dst, bytes),
            FileStorage::Disk(file) => std::fs::copy(file.path(), dst).map(|_| ()),
        }
    }
}

/// Everything the dispatcher needs to build a request context.
#[derive(Debug)]
pub struct ParsedRequest {
    pub parts: Parts,
    pub query: Values,
    pub form: Values,
    pub files: HashMap<String, Vec<UploadedFile>>,
    pub body: Bytes,
}

impl ParsedRequest {
    /// Body parameters first, then query parameters.
    pub fn merged_params(&self) -> Values {
        self.form.merged_over(&self.query)
    }
}

fn is_body_bearing(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

enum BodyKind {
    Multipart,
    UrlEncoded,
    Other,
}

fn body_kind(parts: &Parts) -> Result<BodyKind, Fault> {
    let Some(value) = parts.headers.get(header::CONTENT_TYPE) else {
        return Ok(BodyKind::Other);
    };
    let value = value
        .to_str()
        .map_err(|e| Fault::new(format!("invalid Content-Type header: {e}")))?;
    let mime: mime::Mime = value
        .parse()
        .map_err(|e| Fault::new(format!("invalid Content-Type `{value}`: {e}")))?;

    let kind = if mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA {
        BodyKind::Multipart
    } else if mime.type_() == mime::APPLICATION && mime.subtype() == mime::WWW_FORM_URLENCODED {
        BodyKind::UrlEncoded
    } else {
        BodyKind::Other
    };
    Ok(kind)
}

/// Parse an inbound request into parameters, files and raw body.
pub async fn parse_request(req: Request<Body>, limits: &BodyLimits) -> Result<ParsedRequest, Fault> {
    let (parts, body) = req.into_parts();
    let query = parts.uri.query().map(Values::parse).unwrap_or_default();

    let mut parsed = ParsedRequest {
        parts,
        query,
        form: Values::new(),
        files: HashMap::new(),
        body: Bytes::new(),
    };

    let kind = if is_body_bearing(&parsed.parts.method) {
        body_kind(&parsed.parts)?
    } else {
        BodyKind::Other
    };

    match kind {
        BodyKind::Multipart => {
            let req = Request::from_parts(parsed.parts.clone(), body);
            let (form, files) = parse_multipart(req, limits).await?;
            parsed.form = form;
            parsed.files = files;
        }
        BodyKind::UrlEncoded => {
            let bytes = axum::body::to_bytes(body, limits.max_form_size)
                .await
                .map_err(|e| Fault::new(format!("failed to read form body: {e}")))?;
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| Fault::new(format!("form body is not UTF-8: {e}")))?;
            parsed.form = Values::parse(text);
            parsed.body = bytes;
        }
        BodyKind::Other => {
            parsed.body = axum::body::to_bytes(body, limits.max_body_size)
                .await
                .map_err(|e| Fault::new(format!("failed to read request body: {e}")))?;
        }
    }

    Ok(parsed)
}

async fn parse_multipart(
    req: Request<Body>,
    limits: &BodyLimits,
) -> Result<(Values, HashMap<String, Vec<UploadedFile>>), Fault> {
    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| Fault::new(format!("invalid multipart request: {e}")))?;

    let mut form = Values::new();
    let mut files: HashMap<String, Vec<UploadedFile>> = HashMap::new();
    let mut memory_left = limits.max_multipart_memory;
    let mut text_left = limits.max_multipart_memory.saturating_add(TEXT_VALUE_SLACK);

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| Fault::new(format!("failed to read multipart field: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if file_name.is_none() {
            let data = field
                .bytes()
                .await
                .map_err(|e| Fault::new(format!("failed to read multipart value: {e}")))?;
            if data.len() > text_left {
                return Err(Fault::new("multipart: message too large"));
            }
            text_left -= data.len();
            form.add(name, String::from_utf8_lossy(&data).into_owned());
            continue;
        }

        let mut buffer: Vec<u8> = Vec::new();
        let mut spill: Option<(NamedTempFile, tokio::fs::File)> = None;
        let mut size = 0usize;

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| Fault::new(format!("failed to read multipart file: {e}")))?
        {
            size += chunk.len();
            if let Some((_, out)) = spill.as_mut() {
                out.write_all(&chunk).await?;
                continue;
            }
            if buffer.len() + chunk.len() <= memory_left {
                buffer.extend_from_slice(&chunk);
                continue;
            }

            let temp = NamedTempFile::new()?;
            let mut out = tokio::fs::File::from_std(temp.reopen()?);
            out.write_all(&buffer).await?;
            out.write_all(&chunk).await?;
            buffer = Vec::new();
            spill = Some((temp, out));
        }

        let storage = match spill {
            Some((temp, mut out)) => {
                out.flush().await?;
                tracing::debug!(field = %name, size, "Multipart file spilled to disk");
                FileStorage::Disk(temp)
            }
            None => {
                memory_left -= buffer.len();
                FileStorage::Memory(Bytes::from(buffer))
            }
        };

        files.entry(name.clone()).or_default().push(UploadedFile {
            field_name: name,
            file_name,
            content_type,
            size,
            storage,
        });
    }

    Ok((form, files))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, data) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn test_get_parses_query_only() {
        let req = Request::builder()
            .uri("/search?q=rust&page=2")
            .body(Body::from("ignored=1"))
            .unwrap();
        let parsed = parse_request(req, &BodyLimits::default()).await.unwrap();
        assert_eq!(parsed.query.get("q"), Some("rust"));
        assert!(parsed.form.is_empty());
        assert_eq!(parsed.merged_params().get("page"), Some("2"));
    }

    #[tokio::test]
    async fn test_urlencoded_post() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/save?id=1&tag=a")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .body(Body::from("id=2&name=switch+yard"))
            .unwrap();
        let parsed = parse_request(req, &BodyLimits::default()).await.unwrap();
        assert_eq!(parsed.form.get("name"), Some("switch yard"));

        let merged = parsed.merged_params();
        assert_eq!(merged.get("id"), Some("2"));
        assert_eq!(merged.get("tag"), Some("a"));
    }

    #[tokio::test]
    async fn test_json_body_kept_raw() {
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/items")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"a":1}"#))
            .unwrap();
        let parsed = parse_request(req, &BodyLimits::default()).await.unwrap();
        assert!(parsed.form.is_empty());
        assert_eq!(&parsed.body[..], br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_malformed_content_type_is_fault() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/save")
            .header(header::CONTENT_TYPE, "not a mime;;")
            .body(Body::from("a=1"))
            .unwrap();
        assert!(parse_request(req, &BodyLimits::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_form_is_fault() {
        let limits = BodyLimits {
            max_form_size: 4,
            ..BodyLimits::default()
        };
        let req = Request::builder()
            .method(Method::POST)
            .uri("/save")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=much-too-long"))
            .unwrap();
        assert!(parse_request(req, &limits).await.is_err());
    }

    #[tokio::test]
    async fn test_multipart_small_file_stays_in_memory() {
        let boundary = "XBOUNDARYX";
        let body = multipart_body(
            boundary,
            &[
                ("title", None, &b"holiday"[..]),
                ("photo", Some("a.bin"), &b"0123456789"[..]),
            ],
        );
        let req = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();

        let parsed = parse_request(req, &BodyLimits::default()).await.unwrap();
        assert_eq!(parsed.form.get("title"), Some("holiday"));
        let photo = &parsed.files["photo"][0];
        assert_eq!(photo.file_name.as_deref(), Some("a.bin"));
        assert_eq!(photo.size, 10);
        assert!(!photo.is_on_disk());
        assert_eq!(&photo.bytes().unwrap()[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_multipart_large_file_spills_to_disk() {
        let boundary = "XBOUNDARYX";
        let payload = vec![b'z'; 4096];
        let body = multipart_body(boundary, &[("blob", Some("big.bin"), &payload[..])]);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        let limits = BodyLimits {
            max_multipart_memory: 128,
            ..BodyLimits::default()
        };

        let parsed = parse_request(req, &limits).await.unwrap();
        let blob = &parsed.files["blob"][0];
        assert!(blob.is_on_disk());
        assert_eq!(blob.size, 4096);
        assert_eq!(blob.bytes().unwrap().len(), 4096);

        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("copy.bin");
        blob.save_to(&dst).unwrap();
        assert_eq!(std::fs::read(dst).unwrap(), payload);
    }
}
