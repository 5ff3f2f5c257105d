use docql_error::{QueryFailure, Result, decode_err};
use docql_proto::{Datum, Response, ResponsePayload};

/// A response narrowed to what the caller needs to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResponse {
    /// A single value.
    Scalar(Datum),
    /// A batch of a sequence. `continuation` is set if more batches exist.
    Sequence {
        batch: Vec<Datum>,
        continuation: Option<String>,
    },
    Error(QueryFailure),
}

impl DecodedResponse {
    pub fn as_scalar(&self) -> Option<&Datum> {
        match self {
            DecodedResponse::Scalar(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<(&[Datum], Option<&str>)> {
        match self {
            DecodedResponse::Sequence {
                batch,
                continuation,
            } => Some((batch, continuation.as_deref())),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&QueryFailure> {
        match self {
            DecodedResponse::Error(f) => Some(f),
            _ => None,
        }
    }
}

impl From<ResponsePayload> for DecodedResponse {
    fn from(payload: ResponsePayload) -> Self {
        match payload {
            ResponsePayload::Value { value } => DecodedResponse::Scalar(value),
            ResponsePayload::Sequence { batch } => DecodedResponse::Sequence {
                batch,
                continuation: None,
            },
            ResponsePayload::Partial {
                batch,
                continuation,
            } => DecodedResponse::Sequence {
                batch,
                continuation: Some(continuation),
            },
            ResponsePayload::Done => DecodedResponse::Sequence {
                batch: Vec::new(),
                continuation: None,
            },
            ResponsePayload::Error(failure) => DecodedResponse::Error(failure),
        }
    }
}

/// Decode raw response bytes, checking that they answer `expected_token`.
pub fn decode_response(raw: &[u8], expected_token: u64) -> Result<DecodedResponse> {
    let response: Response = serde_json::from_slice(raw)
        .map_err(|e| decode_err!("Malformed response: {e}"))?;
    if response.token != expected_token {
        return Err(decode_err!(
            "Response token {} does not match request token {expected_token}",
            response.token
        ));
    }
    Ok(response.payload.into())
}
