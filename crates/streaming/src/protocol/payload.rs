//! CBOR payloads carried inside request and response frames.

use crate::error::{CodecError, Result};
use crate::message::{ContentStream, ReceiveRequest, ReceiveResponse, ReceiveStream, Request, Response};

use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// Wire form of a single content part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamPayload {
    /// Identifier of the content part.
    pub id: Uuid,
    /// Declared content type.
    pub content_type: Option<String>,
    /// Declared length, if known.
    pub length: Option<u64>,
    /// Raw content.
    pub content: Bytes,
}

/// Wire form of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Correlation id.
    pub id: Uuid,
    /// Request verb.
    pub verb: String,
    /// Target path.
    pub path: String,
    /// Ordered content parts.
    pub streams: Vec<StreamPayload>,
}

/// Wire form of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Correlation id of the request being answered.
    pub id: Uuid,
    /// Status code.
    pub status_code: u16,
    /// Ordered content parts.
    pub streams: Vec<StreamPayload>,
}

impl From<ContentStream> for StreamPayload {
    fn from(stream: ContentStream) -> Self {
        let (id, content_type, length, content) = stream.into_parts();
        Self {
            id,
            content_type,
            length,
            content,
        }
    }
}

impl From<StreamPayload> for ReceiveStream {
    fn from(payload: StreamPayload) -> Self {
        Self::new(
            payload.id,
            payload.content_type,
            payload.length,
            payload.content,
        )
    }
}

impl RequestPayload {
    /// Build the wire form of `request` under the given correlation id.
    pub fn from_request(id: Uuid, request: Request) -> Self {
        Self {
            id,
            verb: request.verb,
            path: request.path,
            streams: request.streams.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<RequestPayload> for ReceiveRequest {
    fn from(payload: RequestPayload) -> Self {
        Self {
            id: payload.id,
            verb: payload.verb,
            path: payload.path,
            streams: payload.streams.into_iter().map(Into::into).collect(),
        }
    }
}

impl ResponsePayload {
    /// Build the wire form of `response` answering the request `id`.
    pub fn from_response(id: Uuid, response: Response) -> Self {
        Self {
            id,
            status_code: response.status_code,
            streams: response.streams.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<ResponsePayload> for ReceiveResponse {
    fn from(payload: ResponsePayload) -> Self {
        Self {
            id: payload.id,
            status_code: payload.status_code,
            streams: payload.streams.into_iter().map(Into::into).collect(),
        }
    }
}

/// Encode a payload into CBOR bytes.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode<T: Serialize>(payload: &T) -> Result<Bytes> {
    let mut vec = Vec::new();
    ciborium::ser::into_writer(payload, &mut vec).map_err(CodecError::from)?;
    Ok(Bytes::from(vec))
}

/// Decode CBOR bytes into a payload.
///
/// # Errors
///
/// Returns an error if the data is not a valid encoding of `T`.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::de::from_reader(data)
        .map_err(CodecError::from)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_request_payload_preserves_streams() {
        let id = Uuid::new_v4();
        let mut request = Request::post("/echo");
        request.set_body_text("text", "ping");
        request.add_stream(ContentStream::new(vec![1u8, 2, 3]).with_unknown_length());
        let first_stream_id = request.streams[0].id();

        let encoded = encode(&RequestPayload::from_request(id, request)).unwrap();
        let mut received: ReceiveRequest = decode::<RequestPayload>(&encoded).unwrap().into();

        assert_eq!(received.id, id);
        assert_eq!(received.verb, "POST");
        assert_eq!(received.path, "/echo");
        assert_eq!(received.streams.len(), 2);
        assert_eq!(received.streams[0].id, first_stream_id);
        assert_eq!(received.streams[0].content_type.as_deref(), Some("text"));
        assert_eq!(received.streams[0].read_to_string().unwrap(), "ping");
        assert!(received.streams[1].length.is_none());
        assert_eq!(
            received.streams[1].take_content().unwrap(),
            Bytes::from_static(&[1, 2, 3])
        );
    }

    #[test]
    fn test_response_payload_keeps_id_and_status() {
        let id = Uuid::new_v4();
        let response = Response::new(StatusCode::NOT_FOUND);

        let encoded = encode(&ResponsePayload::from_response(id, response)).unwrap();
        let received: ReceiveResponse = decode::<ResponsePayload>(&encoded).unwrap().into();

        assert_eq!(received.id, id);
        assert_eq!(received.status(), Some(StatusCode::NOT_FOUND));
        assert!(received.streams.is_empty());
    }

    #[test]
    fn test_decode_error() {
        let result: Result<RequestPayload> = decode(&[0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }
}
