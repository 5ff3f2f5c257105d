use docql_error::QueryFailure;
use serde::{Deserialize, Serialize};

use crate::datum::Datum;

/// A response read from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub token: u64,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    /// A single value (scalar, object, or an array returned as one value).
    Value { value: Datum },
    /// A complete sequence. No more batches follow.
    Sequence { batch: Vec<Datum> },
    /// One batch of a sequence. More may be fetched with the continuation.
    Partial {
        batch: Vec<Datum>,
        continuation: String,
    },
    /// End of a sequence with no further elements.
    Done,
    /// The query failed.
    Error(QueryFailure),
}

impl Response {
    pub fn value(token: u64, value: impl Into<Datum>) -> Self {
        Response {
            token,
            payload: ResponsePayload::Value {
                value: value.into(),
            },
        }
    }

    pub fn sequence(token: u64, batch: Vec<Datum>) -> Self {
        Response {
            token,
            payload: ResponsePayload::Sequence { batch },
        }
    }

    pub fn partial(token: u64, batch: Vec<Datum>, continuation: impl Into<String>) -> Self {
        Response {
            token,
            payload: ResponsePayload::Partial {
                batch,
                continuation: continuation.into(),
            },
        }
    }

    pub fn done(token: u64) -> Self {
        Response {
            token,
            payload: ResponsePayload::Done,
        }
    }

    pub fn error(token: u64, failure: QueryFailure) -> Self {
        Response {
            token,
            payload: ResponsePayload::Error(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use docql_error::ServerErrorClass;

    use super::*;

    #[test]
    fn parse_partial() {
        let resp: Response = serde_json::from_str(
            r#"{"token": 4, "type": "partial", "batch": [1, {"a": 2}], "continuation": "x"}"#,
        )
        .unwrap();
        assert_eq!(4, resp.token);
        match resp.payload {
            ResponsePayload::Partial {
                batch,
                continuation,
            } => {
                assert_eq!(2, batch.len());
                assert_eq!(Datum::Number(1.0), batch[0]);
                assert_eq!("x", continuation);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn parse_error() {
        let resp: Response = serde_json::from_str(
            r#"{"token": 1, "type": "error", "class": "runtime", "message": "boom"}"#,
        )
        .unwrap();
        assert_eq!(
            Response::error(
                1,
                QueryFailure {
                    class: ServerErrorClass::Runtime,
                    message: "boom".to_string(),
                    backtrace: Vec::new(),
                }
            ),
            resp
        );
    }

    #[test]
    fn done_round_trips() {
        let s = serde_json::to_string(&Response::done(2)).unwrap();
        assert_eq!(r#"{"token":2,"type":"done"}"#, s);
        assert_eq!(Response::done(2), serde_json::from_str(&s).unwrap());
    }
}
