//! Application-level requests and responses.
//!
//! [`Request`] and [`Response`] are authored locally and sent over the wire.
//! [`ReceiveRequest`] and [`ReceiveResponse`] are their decoded inbound
//! counterparts, whose content streams can each be read exactly once.

use crate::error::{CodecError, Error, Result};

use bytes::Bytes;
use http::StatusCode;
use uuid::Uuid;

/// A single named content part of a request or response.
#[derive(Debug, Clone)]
pub struct ContentStream {
    id: Uuid,
    content_type: Option<String>,
    length: Option<u64>,
    content: Bytes,
}

impl ContentStream {
    /// Create a content part with a freshly generated identifier.
    pub fn new(content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4(),
            content_type: None,
            length: Some(content.len() as u64),
            content,
        }
    }

    /// Set the content type of this part.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Mark the length of this part as not known in advance.
    #[must_use]
    pub fn with_unknown_length(mut self) -> Self {
        self.length = None;
        self
    }

    /// Generated identifier of this part.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Declared content type, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Declared length, if known.
    #[must_use]
    pub const fn length(&self) -> Option<u64> {
        self.length
    }

    /// Raw content.
    #[must_use]
    pub const fn content(&self) -> &Bytes {
        &self.content
    }

    pub(crate) fn into_parts(self) -> (Uuid, Option<String>, Option<u64>, Bytes) {
        (self.id, self.content_type, self.length, self.content)
    }
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Verb, e.g. `GET` or `POST`.
    pub verb: String,
    /// Target path.
    pub path: String,
    /// Ordered content parts.
    pub streams: Vec<ContentStream>,
}

impl Request {
    /// Create a request without content.
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
            streams: Vec::new(),
        }
    }

    /// Create a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Create a `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    /// Create a `PUT` request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new("PUT", path)
    }

    /// Create a `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new("DELETE", path)
    }

    /// Append a content part.
    pub fn add_stream(&mut self, stream: ContentStream) {
        self.streams.push(stream);
    }

    /// Append a text content part with the given content type.
    pub fn set_body_text(&mut self, content_type: impl Into<String>, text: impl Into<String>) {
        let text: String = text.into();
        self.add_stream(ContentStream::new(text).with_content_type(content_type));
    }
}

/// An outbound response.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP-style status code.
    pub status_code: u16,
    /// Ordered content parts.
    pub streams: Vec<ContentStream>,
}

impl Response {
    /// Create a response without content.
    #[must_use]
    pub const fn new(status: StatusCode) -> Self {
        Self {
            status_code: status.as_u16(),
            streams: Vec::new(),
        }
    }

    /// Append a content part.
    pub fn add_stream(&mut self, stream: ContentStream) {
        self.streams.push(stream);
    }

    /// Append a text content part with the given content type.
    pub fn set_body_text(&mut self, content_type: impl Into<String>, text: impl Into<String>) {
        let text: String = text.into();
        self.add_stream(ContentStream::new(text).with_content_type(content_type));
    }
}

/// A received content part. The content can be taken exactly once.
#[derive(Debug)]
pub struct ReceiveStream {
    /// Identifier assigned by the sender.
    pub id: Uuid,
    /// Declared content type, if any.
    pub content_type: Option<String>,
    /// Declared length, if known.
    pub length: Option<u64>,
    content: Option<Bytes>,
}

impl ReceiveStream {
    pub(crate) fn new(
        id: Uuid,
        content_type: Option<String>,
        length: Option<u64>,
        content: Bytes,
    ) -> Self {
        Self {
            id,
            content_type,
            length,
            content: Some(content),
        }
    }

    /// Take the content. Returns `None` once it has already been taken.
    pub fn take_content(&mut self) -> Option<Bytes> {
        self.content.take()
    }

    /// Whether the content has already been taken.
    #[must_use]
    pub const fn is_consumed(&self) -> bool {
        self.content.is_none()
    }

    /// Take the content and decode it as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamAlreadyConsumed`] on a second read, or a codec
    /// error if the content is not valid UTF-8.
    pub fn read_to_string(&mut self) -> Result<String> {
        let content = self.take_content().ok_or(Error::StreamAlreadyConsumed)?;
        String::from_utf8(content.to_vec())
            .map_err(|e| CodecError::DeserializationFailed(e.to_string()).into())
    }
}

/// A decoded inbound request.
#[derive(Debug)]
pub struct ReceiveRequest {
    /// Correlation id chosen by the remote side.
    pub id: Uuid,
    /// Verb, e.g. `GET` or `POST`.
    pub verb: String,
    /// Target path.
    pub path: String,
    /// Ordered content parts.
    pub streams: Vec<ReceiveStream>,
}

/// A decoded response to a locally initiated request.
#[derive(Debug)]
pub struct ReceiveResponse {
    /// Correlation id of the request this answers.
    pub id: Uuid,
    /// HTTP-style status code.
    pub status_code: u16,
    /// Ordered content parts.
    pub streams: Vec<ReceiveStream>,
}

impl ReceiveResponse {
    /// Status code as an [`http::StatusCode`], if it is a valid one.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status_code).ok()
    }
}
