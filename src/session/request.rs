//! Usage: Replayable outbound request description (method, path, query, headers, body).

use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub file_name: Option<String>,
    pub mime: Option<String>,
    pub data: Bytes,
}

/// Bodies are held as owned bytes so the request can be rebuilt byte-for-byte for a
/// redispatch; `reqwest::Body`/`Form` are single-use.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Bytes),
    Multipart(Vec<MultipartPart>),
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> AppResult<Self> {
        let encoded = serde_json::to_vec(body).map_err(|e| {
            AppError::from_code(
                ErrorCode::InvalidInput,
                format!("failed to encode request body: {e}"),
            )
        })?;
        self.body = RequestBody::Json(Bytes::from(encoded));
        Ok(self)
    }

    pub fn multipart(mut self, parts: Vec<MultipartPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    /// `"GET /auth/me"`, for logs.
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub(crate) fn url(&self, base_url: &str) -> AppResult<reqwest::Url> {
        let path = self.path.trim();
        let joined = if path.starts_with('/') {
            format!("{}{path}", base_url.trim_end_matches('/'))
        } else {
            format!("{}/{path}", base_url.trim_end_matches('/'))
        };
        reqwest::Url::parse(&joined).map_err(|e| {
            AppError::from_code(
                ErrorCode::InvalidInput,
                format!("invalid request url {joined}: {e}"),
            )
        })
    }

    /// Builds a fresh `reqwest` request. Any caller-supplied `Authorization` header is
    /// dropped; the only one sent is the bearer passed in here.
    pub(crate) fn build(
        &self,
        http: &reqwest::Client,
        base_url: &str,
        bearer: Option<&str>,
    ) -> AppResult<reqwest::RequestBuilder> {
        let mut headers = self.headers.clone();
        headers.remove(AUTHORIZATION);

        let mut builder = http.request(self.method.clone(), self.url(base_url)?);
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }

        builder = match &self.body {
            RequestBody::Empty => builder.headers(headers),
            RequestBody::Json(bytes) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                builder.headers(headers).body(bytes.clone())
            }
            RequestBody::Multipart(parts) => {
                // reqwest sets the multipart content type (with boundary) itself.
                headers.remove(CONTENT_TYPE);
                builder.headers(headers).multipart(build_form(parts)?)
            }
        };

        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }
}

fn build_form(parts: &[MultipartPart]) -> AppResult<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        let mut field = reqwest::multipart::Part::bytes(part.data.to_vec());
        if let Some(file_name) = part.file_name.as_deref() {
            field = field.file_name(file_name.to_string());
        }
        if let Some(mime) = part.mime.as_deref() {
            field = field.mime_str(mime).map_err(|e| {
                AppError::from_code(
                    ErrorCode::InvalidInput,
                    format!("invalid multipart mime type {mime}: {e}"),
                )
            })?;
        }
        form = form.part(part.name.clone(), field);
    }
    Ok(form)
}

/// Opaque record id used as a single path segment.
pub(crate) fn id_segment(id: &str) -> AppResult<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::from_code(ErrorCode::InvalidInput, "id is empty"));
    }
    if id
        .chars()
        .any(|ch| matches!(ch, '/' | '?' | '#' | '%') || ch.is_whitespace())
    {
        return Err(AppError::from_code(
            ErrorCode::InvalidInput,
            format!("id contains reserved characters: {id}"),
        ));
    }
    Ok(id)
}
