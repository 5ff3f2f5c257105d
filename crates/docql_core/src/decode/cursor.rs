use std::collections::VecDeque;

use docql_error::{DocQlError, Result, connection_err, decode_err};
use docql_proto::{Datum, RequestEnvelope};
use futures::Stream;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::response::{DecodedResponse, decode_response};
use crate::outcome::write_outcome::{WriteKind, WriteOutcome};
use crate::query::{ResultShape, WriteState};
use crate::session::{Connection, Session};

/// Lazily consumed result of a query.
///
/// Batches are fetched from the server as elements are consumed. Once an
/// error is observed the cursor is failed and every further call returns
/// that same error.
#[derive(Debug)]
pub struct Cursor<C: Connection> {
    session: Session<C>,
    token: u64,
    shape: ResultShape,
    /// Single value returned instead of a sequence.
    atom: Option<Datum>,
    buffer: VecDeque<Datum>,
    continuation: Option<String>,
    /// Set while a continuation is outstanding. Still set on entry means the
    /// future that sent it was dropped and the reply is lost.
    fetching: bool,
    error: Option<DocQlError>,
    write_state: Option<WriteState>,
}

impl<C: Connection> Cursor<C> {
    pub(crate) fn new(
        session: Session<C>,
        token: u64,
        shape: ResultShape,
        first: DecodedResponse,
    ) -> Self {
        let write_state = match shape {
            ResultShape::Write { .. } => Some(WriteState::Evaluated),
            ResultShape::Other => None,
        };
        let mut cursor = Cursor {
            session,
            token,
            shape,
            atom: None,
            buffer: VecDeque::new(),
            continuation: None,
            fetching: false,
            error: None,
            write_state,
        };
        if let Err(e) = cursor.apply(first) {
            cursor.error = Some(e);
        }
        cursor
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    pub fn write_state(&self) -> Option<WriteState> {
        self.write_state
    }

    /// The terminal error of this cursor, if any.
    pub fn err(&self) -> Option<&DocQlError> {
        self.error.as_ref()
    }

    /// Returns true if every element has been consumed and no more batches
    /// exist on the server.
    pub fn is_exhausted(&self) -> bool {
        self.error.is_none()
            && self.atom.is_none()
            && self.buffer.is_empty()
            && self.continuation.is_none()
    }

    fn apply(&mut self, response: DecodedResponse) -> Result<()> {
        match response {
            DecodedResponse::Scalar(value) => self.atom = Some(value),
            DecodedResponse::Sequence {
                batch,
                continuation,
            } => {
                trace!(
                    token = self.token,
                    rows = batch.len(),
                    more = continuation.is_some(),
                    "received batch"
                );
                self.buffer.extend(batch);
                self.continuation = continuation;
            }
            DecodedResponse::Error(failure) => return Err(DocQlError::Query(failure)),
        }
        Ok(())
    }

    fn fail(&mut self, err: DocQlError) -> DocQlError {
        debug!(token = self.token, %err, "cursor failed");
        self.continuation = None;
        self.error = Some(err.clone());
        err
    }

    /// Return the sticky error, failing the cursor first if an earlier fetch
    /// never completed.
    fn check_abandoned_fetch(&mut self) -> Result<()> {
        if self.fetching {
            self.fetching = false;
            return Err(self.fail(connection_err!(
                "Fetch for token {} was cancelled before its reply arrived",
                self.token
            )));
        }
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn fetch_more(&mut self, continuation: String) -> Result<()> {
        let request = RequestEnvelope::continue_with(self.token, continuation);
        let raw = self.session.send(request).await?;
        match decode_response(&raw, self.token)? {
            DecodedResponse::Scalar(_) => Err(decode_err!(
                "Unexpected single value in response to a continuation"
            )),
            response => self.apply(response),
        }
    }

    /// Next element of the result, or None once the result is exhausted.
    ///
    /// A single array value is iterated element by element.
    pub async fn next(&mut self) -> Result<Option<Datum>> {
        loop {
            self.check_abandoned_fetch()?;
            if let Some(atom) = self.atom.take() {
                match atom {
                    Datum::Array(items) => self.buffer.extend(items),
                    other => self.buffer.push_back(other),
                }
            }
            if let Some(datum) = self.buffer.pop_front() {
                return Ok(Some(datum));
            }
            let Some(continuation) = self.continuation.clone() else {
                return Ok(None);
            };
            self.fetching = true;
            let fetched = self.fetch_more(continuation).await;
            self.fetching = false;
            if let Err(e) = fetched {
                return Err(self.fail(e));
            }
        }
    }

    /// Read the result as exactly one value.
    ///
    /// A single value response is returned as is, arrays included. A
    /// sequence must contain exactly one element.
    pub async fn one_datum(&mut self) -> Result<Datum> {
        self.check_abandoned_fetch()?;
        if let Some(atom) = self.atom.take() {
            return Ok(atom);
        }

        let first = match self.next().await? {
            Some(first) => first,
            None => return Err(self.fail(decode_err!("Expected one value, result was empty"))),
        };
        if self.next().await?.is_some() {
            return Err(self.fail(decode_err!(
                "Expected one value, result had more than one"
            )));
        }
        Ok(first)
    }

    pub async fn one<T: DeserializeOwned>(&mut self) -> Result<T> {
        let datum = self.one_datum().await?;
        datum.deserialize_into()
    }

    /// Append every remaining element to `dest`.
    pub async fn collect_into<T: DeserializeOwned>(&mut self, dest: &mut Vec<T>) -> Result<()> {
        while let Some(datum) = self.next().await? {
            let value = datum.deserialize_into().map_err(|e| self.fail(e))?;
            dest.push(value);
        }
        Ok(())
    }

    pub async fn collect<T: DeserializeOwned>(&mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        self.collect_into(&mut out).await?;
        Ok(out)
    }

    /// Read the result as a write summary.
    ///
    /// Point writes are checked to have touched at most one row.
    pub async fn write_outcome(&mut self) -> Result<WriteOutcome> {
        let (kind, point) = match self.shape {
            ResultShape::Write { kind, point } => (kind, point),
            ResultShape::Other => (WriteKind::Mixed, false),
        };
        let datum = self.one_datum().await?;
        let outcome = WriteOutcome::from_datum(kind, &datum).map_err(|e| self.fail(e))?;
        if point {
            outcome.validate_point().map_err(|e| self.fail(e))?;
        }
        self.write_state = Some(WriteState::Aggregated);
        debug!(token = self.token, %outcome, "write finished");
        Ok(outcome)
    }

    /// Convert into a stream of elements.
    pub fn into_stream(self) -> impl Stream<Item = Result<Datum>> {
        futures::stream::try_unfold(self, |mut cursor| async move {
            let next = cursor.next().await?;
            Ok::<_, DocQlError>(next.map(|datum| (datum, cursor)))
        })
    }

    /// Stop the query, releasing any server side state.
    ///
    /// Remaining buffered elements are dropped.
    pub async fn close(&mut self) -> Result<()> {
        self.atom = None;
        self.buffer.clear();
        if self.continuation.take().is_none() {
            return Ok(());
        }

        debug!(token = self.token, "stopping query");
        let raw = self.session.send(RequestEnvelope::stop(self.token)).await?;
        match decode_response(&raw, self.token)? {
            DecodedResponse::Error(failure) => Err(DocQlError::Query(failure)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use docql_error::{ErrorKind, QueryFailure, ServerErrorClass};
    use docql_proto::{Request, ResponsePayload};
    use futures::{FutureExt, TryStreamExt};
    use serde_json::json;

    use super::*;
    use crate::config::SessionConfig;
    use crate::expr::Expr;
    use crate::expr::relation::table;
    use crate::testutil::ScriptedConnection;

    fn session() -> Session<ScriptedConnection> {
        Session::new(ScriptedConnection::new(), SessionConfig::default())
    }

    fn nums(ns: &[i64]) -> Vec<Datum> {
        ns.iter().map(|n| Datum::from(*n)).collect()
    }

    fn runtime_failure(message: &str) -> QueryFailure {
        QueryFailure {
            class: ServerErrorClass::Runtime,
            message: message.to_string(),
            backtrace: Vec::new(),
        }
    }

    #[tokio::test]
    async fn iterates_across_batches() {
        let session = session();
        let conn = session.connection();
        conn.push_payload(ResponsePayload::Partial {
            batch: nums(&[1, 2]),
            continuation: "c1".to_string(),
        });
        conn.push_payload(ResponsePayload::Partial {
            batch: nums(&[3]),
            continuation: "c2".to_string(),
        });
        conn.push_payload(ResponsePayload::Sequence { batch: nums(&[4]) });

        let mut cursor = table("t").unwrap().run(&session).await.unwrap();
        let got: Vec<i64> = cursor.collect().await.unwrap();
        assert_eq!(vec![1, 2, 3, 4], got);
        assert!(cursor.is_exhausted());
        assert_eq!(None, cursor.next().await.unwrap());

        let requests = conn.requests();
        assert_eq!(3, requests.len());
        assert!(requests.iter().all(|r| r.token == cursor.token()));
        assert_eq!(
            Request::Continue {
                continuation: "c1".to_string()
            },
            requests[1].request
        );
        assert_eq!(
            Request::Continue {
                continuation: "c2".to_string()
            },
            requests[2].request
        );
    }

    #[tokio::test]
    async fn cancelled_fetch_fails_cursor() {
        let session = session();
        let conn = session.connection();
        conn.push_payload(ResponsePayload::Partial {
            batch: nums(&[1]),
            continuation: "c1".to_string(),
        });
        conn.push_hang();

        let mut cursor = table("t").unwrap().run(&session).await.unwrap();
        assert_eq!(Some(Datum::from(1)), cursor.next().await.unwrap());
        assert!(cursor.next().now_or_never().is_none());
        assert!(!cursor.is_exhausted());

        let err = cursor.next().await.unwrap_err();
        assert_eq!(ErrorKind::Connection, err.kind());
        assert_eq!(Some(&err), cursor.err());
        assert!(!cursor.is_exhausted());
        assert_eq!(err, cursor.collect::<i64>().await.unwrap_err());
        assert_eq!(2, conn.requests().len());
    }

    #[tokio::test]
    async fn batches_fetched_lazily() {
        let session = session();
        let conn = session.connection();
        conn.push_payload(ResponsePayload::Partial {
            batch: nums(&[1]),
            continuation: "c1".to_string(),
        });

        let mut cursor = table("t").unwrap().run(&session).await.unwrap();
        assert_eq!(Some(Datum::from(1)), cursor.next().await.unwrap());
        assert_eq!(1, conn.requests().len());
    }

    #[tokio::test]
    async fn error_in_later_batch_is_sticky() {
        let session = session();
        let conn = session.connection();
        conn.push_payload(ResponsePayload::Partial {
            batch: nums(&[1]),
            continuation: "c1".to_string(),
        });
        conn.push_payload(ResponsePayload::Error(runtime_failure("boom")));

        let mut cursor = table("t").unwrap().run(&session).await.unwrap();
        assert_eq!(Some(Datum::from(1)), cursor.next().await.unwrap());

        let first = cursor.next().await.unwrap_err();
        assert_eq!(ErrorKind::Query, first.kind());
        let second = cursor.next().await.unwrap_err();
        assert_eq!(first, second);
        assert_eq!(Some(&first), cursor.err());
        assert_eq!(first, cursor.collect::<i64>().await.unwrap_err());
        // No further requests after the failure.
        assert_eq!(2, conn.requests().len());
    }

    #[tokio::test]
    async fn one_on_value() {
        let session = session();
        session.connection().push_payload(ResponsePayload::Value {
            value: Datum::from(json!([1, 2, 3])),
        });
        let mut cursor = Expr::array([1, 2, 3]).run(&session).await.unwrap();
        let got: Vec<i64> = cursor.one().await.unwrap();
        assert_eq!(vec![1, 2, 3], got);
    }

    #[tokio::test]
    async fn collect_value_array() {
        let session = session();
        session.connection().push_payload(ResponsePayload::Value {
            value: Datum::from(json!([1, 2, 3])),
        });
        let mut cursor = Expr::array([1, 2, 3]).run(&session).await.unwrap();
        let got: Vec<i64> = cursor.collect().await.unwrap();
        assert_eq!(vec![1, 2, 3], got);
    }

    #[tokio::test]
    async fn one_cardinality() {
        let session = session();
        let conn = session.connection();

        conn.push_payload(ResponsePayload::Sequence { batch: nums(&[7]) });
        let mut cursor = table("t").unwrap().run(&session).await.unwrap();
        assert_eq!(7, cursor.one::<i64>().await.unwrap());

        conn.push_payload(ResponsePayload::Sequence { batch: Vec::new() });
        let mut cursor = table("t").unwrap().run(&session).await.unwrap();
        assert_eq!(ErrorKind::Decode, cursor.one::<i64>().await.unwrap_err().kind());

        // More than one element, spread across batches.
        conn.push_payload(ResponsePayload::Partial {
            batch: nums(&[1]),
            continuation: "c".to_string(),
        });
        conn.push_payload(ResponsePayload::Sequence { batch: nums(&[2]) });
        let mut cursor = table("t").unwrap().run(&session).await.unwrap();
        assert_eq!(ErrorKind::Decode, cursor.one::<i64>().await.unwrap_err().kind());
    }

    #[tokio::test]
    async fn deserialize_failure_is_decode_error() {
        let session = session();
        session.connection().push_payload(ResponsePayload::Value {
            value: Datum::from("not a number"),
        });
        let mut cursor = Expr::from("not a number").run(&session).await.unwrap();
        assert_eq!(ErrorKind::Decode, cursor.one::<i64>().await.unwrap_err().kind());
    }

    #[tokio::test]
    async fn stream_yields_all() {
        let session = session();
        let conn = session.connection();
        conn.push_payload(ResponsePayload::Partial {
            batch: nums(&[1, 2]),
            continuation: "c".to_string(),
        });
        conn.push_payload(ResponsePayload::Sequence { batch: nums(&[3]) });

        let cursor = table("t").unwrap().run(&session).await.unwrap();
        let got: Vec<Datum> = cursor.into_stream().try_collect().await.unwrap();
        assert_eq!(nums(&[1, 2, 3]), got);
    }

    #[tokio::test]
    async fn close_sends_stop() {
        let session = session();
        let conn = session.connection();
        conn.push_payload(ResponsePayload::Partial {
            batch: nums(&[1, 2]),
            continuation: "c".to_string(),
        });
        conn.push_payload(ResponsePayload::Done);

        let mut cursor = table("t").unwrap().run(&session).await.unwrap();
        cursor.close().await.unwrap();
        assert_eq!(None, cursor.next().await.unwrap());

        let requests = conn.requests();
        assert_eq!(Request::Stop, requests[1].request);
        assert_eq!(requests[0].token, requests[1].token);

        // Closing again does nothing.
        cursor.close().await.unwrap();
        assert_eq!(2, conn.requests().len());
    }

    #[tokio::test]
    async fn write_outcome_for_point_write() {
        let session = session();
        session.connection().push_payload(ResponsePayload::Value {
            value: Datum::from(json!({"replaced": 1})),
        });

        let write = table("t")
            .unwrap()
            .get(1)
            .replace(|row| row.merge(Expr::object([("a", 1)])));
        let mut cursor = write.run(&session).await.unwrap();
        assert_eq!(Some(WriteState::Evaluated), cursor.write_state());

        let outcome = cursor.write_outcome().await.unwrap();
        assert_eq!(1, outcome.modified);
        assert_eq!(Some(WriteState::Aggregated), cursor.write_state());
    }

    #[tokio::test]
    async fn point_write_with_many_rows_fails() {
        let session = session();
        session.connection().push_payload(ResponsePayload::Value {
            value: Datum::from(json!({"deleted": 2})),
        });

        let mut cursor = table("t").unwrap().get(1).delete().run(&session).await.unwrap();
        let err = cursor.write_outcome().await.unwrap_err();
        assert_eq!(ErrorKind::Decode, err.kind());
    }

    #[tokio::test]
    async fn transport_failure_during_continue() {
        let session = session();
        let conn = session.connection();
        conn.push_payload(ResponsePayload::Partial {
            batch: Vec::new(),
            continuation: "c".to_string(),
        });
        conn.push_failure(DocQlError::Connection("reset".to_string()));

        let mut cursor = table("t").unwrap().run(&session).await.unwrap();
        let err = cursor.next().await.unwrap_err();
        assert_eq!(ErrorKind::Connection, err.kind());
        assert_eq!(err, cursor.next().await.unwrap_err());
    }
}
