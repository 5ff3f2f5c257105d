//! Decoding of server responses and iteration over query results.

pub mod cursor;
pub mod response;

pub use cursor::Cursor;
pub use response::{DecodedResponse, decode_response};
