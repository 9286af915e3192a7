//! Replayable request description

use super::error::ClientError;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

/// Method, headers and body of a request
///
/// The body is held as [`Bytes`] so the same request can be sent a second
/// time after a silent sign-in without re-serializing anything.
#[derive(Debug, Clone, Default)]
pub struct RequestInit {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RequestInit {
    /// A GET request with no extra headers
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get() -> Self {
        Self::new()
    }

    pub fn post() -> Self {
        Self::new().method(Method::POST)
    }

    pub fn put() -> Self {
        Self::new().method(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new().method(Method::DELETE)
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set the content type
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Serialization`] if `value` cannot be serialized
    pub fn json<T: serde::Serialize + ?Sized>(self, value: &T) -> Result<Self, ClientError> {
        let body = serde_json::to_vec(value)?;
        Ok(self
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body))
    }
}
