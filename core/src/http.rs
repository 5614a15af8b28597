//! HTTP request and response types described as plain data.
//!
//! # Design
//! The interceptors and the retry loop only ever see these values; the
//! `Transport` implementation is the single place that turns them into real
//! network I/O. Bodies are kept as owned data (a JSON value or a list of
//! form parts) so the exact same request can be reissued on retry.

use std::time::Duration;

use serde::Serialize;

use crate::error::ApiError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

/// Per-call options recognised by the client.
///
/// `show_loading` emits start/finish events for a loading indicator,
/// `show_error` controls whether failures are logged at `warn`, and
/// `timeout` overrides the service timeout for every attempt of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub show_loading: bool,
    pub show_error: bool,
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            show_loading: false,
            show_error: true,
            timeout: None,
        }
    }
}

/// One named part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

impl FormPart {
    pub fn name(&self) -> &str {
        match self {
            FormPart::Text { name, .. } | FormPart::File { name, .. } => name,
        }
    }
}

/// In-memory file contents ready to be sent in a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Read a file from disk, naming the upload after the file.
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::new(file_name, bytes))
    }

    fn into_part(self, name: impl Into<String>) -> FormPart {
        FormPart::File {
            name: name.into(),
            file_name: self.file_name,
            mime: self.mime,
            bytes: self.bytes,
        }
    }
}

/// Ordered multipart form contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    pub parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(mut self, name: impl Into<String>, file: FileUpload) -> Self {
        self.parts.push(file.into_part(name));
        self
    }

    /// Append every non-null field of `fields` as a text part. Strings are
    /// sent verbatim, other values as their JSON text.
    pub fn fields<F: Serialize + ?Sized>(mut self, fields: &F) -> Result<Self, ApiError> {
        for (name, value) in object_pairs(fields)? {
            self = self.text(name, value);
        }
        Ok(self)
    }
}

impl From<FileUpload> for MultipartForm {
    fn from(file: FileUpload) -> Self {
        MultipartForm::new().file("file", file)
    }
}

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartForm),
}

/// An HTTP request described as plain data.
///
/// `url` starts as the path given by the caller and is resolved against the
/// service base URL by `HttpClient` before the interceptors run.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub options: RequestOptions,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            options: RequestOptions::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    /// Append query parameters from any value that serializes to a JSON
    /// object. `()` adds nothing.
    pub fn query<Q: Serialize + ?Sized>(mut self, query: &Q) -> Result<Self, ApiError> {
        self.query.extend(object_pairs(query)?);
        Ok(self)
    }

    /// Set a JSON body. A value serializing to `null`, such as `()`, leaves
    /// the request without a body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value =
            serde_json::to_value(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.body = if value.is_null() {
            RequestBody::Empty
        } else {
            RequestBody::Json(value)
        };
        Ok(self)
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Insert or replace a header, matching names case-insensitively.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Insert or replace a query parameter.
    pub fn set_query(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.query.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.query.push((name, value)),
        }
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Flatten a value serializing to a JSON object into string pairs.
fn object_pairs<T: Serialize + ?Sized>(value: &T) -> Result<Vec<(String, String)>, ApiError> {
    let value = serde_json::to_value(value).map_err(|e| ApiError::Serialization(e.to_string()))?;
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let text = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, text)
            })
            .collect()),
        other => Err(ApiError::Serialization(format!(
            "expected an object of parameters, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_skips_null_fields_and_stringifies_values() {
        let req = HttpRequest::get("/files")
            .query(&json!({"page": 2, "keyword": "cat", "folder": null}))
            .unwrap();
        assert_eq!(req.query_value("page"), Some("2"));
        assert_eq!(req.query_value("keyword"), Some("cat"));
        assert_eq!(req.query_value("folder"), None);
    }

    #[test]
    fn unit_query_and_body_are_empty() {
        let req = HttpRequest::post("/auth/logout").query(&()).unwrap().json(&()).unwrap();
        assert!(req.query.is_empty());
        assert_eq!(req.body, RequestBody::Empty);
    }

    #[test]
    fn scalar_query_is_rejected() {
        let err = HttpRequest::get("/x").query(&5).unwrap_err();
        assert!(matches!(err, ApiError::Serialization(_)));
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut req = HttpRequest::get("/x").header("Content-Type", "application/json");
        req.set_header("content-type", "multipart/form-data");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header_value("CONTENT-TYPE"), Some("multipart/form-data"));
    }

    #[test]
    fn set_query_replaces_existing_value() {
        let mut req = HttpRequest::get("/x");
        req.set_query("_t", "1");
        req.set_query("_t", "2");
        assert_eq!(req.query, vec![("_t".to_string(), "2".to_string())]);
    }

    #[test]
    fn form_fields_become_text_parts() {
        let form = MultipartForm::from(FileUpload::new("a.txt", b"hi".to_vec()))
            .fields(&json!({"folder": "docs", "generateThumbnail": true, "maxSize": null}))
            .unwrap();
        let names: Vec<&str> = form.parts.iter().map(FormPart::name).collect();
        assert_eq!(names, vec!["file", "folder", "generateThumbnail"]);
        assert_eq!(
            form.parts[2],
            FormPart::Text {
                name: "generateThumbnail".to_string(),
                value: "true".to_string()
            }
        );
    }

    #[test]
    fn response_success_range() {
        assert!(HttpResponse::new(204, Vec::new()).is_success());
        assert!(!HttpResponse::new(301, Vec::new()).is_success());
        assert_eq!(HttpResponse::new(200, "ok").text(), "ok");
    }
}
