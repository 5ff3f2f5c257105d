//! Wire-level types exchanged with the server.
//!
//! Requests and responses are JSON documents. The byte framing underneath them
//! belongs to the connection implementation.
pub mod datum;
pub mod envelope;
pub mod response;
pub mod term;

mod datum_de;

pub use datum::Datum;
pub use datum_de::DatumDeError;
pub use envelope::{Request, RequestEnvelope};
pub use response::{Response, ResponsePayload};
pub use term::{Term, TermType};
