use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use exportcheck_core::TelemetryBatch;

use super::Status;

/// One message on an export connection. Every request is answered by
/// exactly one response on the same connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportFrame {
    Request { batch: TelemetryBatch },
    Response { status: Status },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct ExportFrameCodec {
    length_codec: LengthDelimitedCodec,
}

impl ExportFrameCodec {
    pub fn new() -> Self {
        Self {
            length_codec: LengthDelimitedCodec::new(),
        }
    }
}

impl Default for ExportFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ExportFrameCodec {
    type Item = ExportFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.length_codec.decode(src)? else {
            return Ok(None);
        };

        Ok(Some(serde_json::from_slice(&frame)?))
    }
}

impl Encoder<ExportFrame> for ExportFrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: ExportFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)?;
        self.length_codec.encode(Bytes::from(json), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exportcheck_core::{DataType, UniqueId};

    #[test]
    fn request_and_response_share_one_buffer() {
        let request = ExportFrame::Request {
            batch: TelemetryBatch::with_id(DataType::Metrics, &UniqueId::from("5")),
        };
        let response = ExportFrame::Response {
            status: Status::deadline_exceeded("try later"),
        };

        let mut buffer = BytesMut::new();
        let mut codec = ExportFrameCodec::new();
        codec.encode(request.clone(), &mut buffer).unwrap();
        codec.encode(response.clone(), &mut buffer).unwrap();

        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(request));
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(response));
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut buffer = BytesMut::new();
        let mut codec = ExportFrameCodec::new();
        codec
            .encode(
                ExportFrame::Response {
                    status: Status::ok(),
                },
                &mut buffer,
            )
            .unwrap();
        let mut head = buffer.split_to(buffer.len() - 3);
        assert!(codec.decode(&mut head).unwrap().is_none());
        head.unsplit(buffer);
        assert!(codec.decode(&mut head).unwrap().is_some());
    }

    #[test]
    fn garbage_payload_is_a_json_error() {
        let mut buffer = BytesMut::new();
        LengthDelimitedCodec::new()
            .encode(Bytes::from_static(b"not json"), &mut buffer)
            .unwrap();
        let err = ExportFrameCodec::new().decode(&mut buffer).unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }
}
