//! Content encoding strategies.
//!
//! A [`Dispatcher`](crate::Dispatcher) is parameterized by exactly one
//! [`Encoding`] for its lifetime. Every [`Context`](crate::Context) serve
//! helper stamps the encoding's content type and runs values through it;
//! [`decode_body`](crate::Context::decode_body) runs the inverse.
//!
//! serde's serialize/deserialize API is generic, so the strategy set is a
//! closed enum rather than a trait object. Both strategies satisfy the same
//! contract: encode to bytes, decode from a reader, name a content type.

use std::io::Read;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Error;

/// The wire encoding used for request bodies and encoded responses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Encoding {
    /// JSON via `serde_json`.
    #[default]
    Json,
    /// Compact binary msgpack via `rmp-serde`. Structs encode as maps so
    /// payloads stay self-describing across schema changes.
    MsgPack,
}

impl Encoding {
    /// Serializes `value` into a fresh byte buffer.
    pub fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, Error> {
        match self {
            Self::Json => serde_json::to_vec(value).map_err(Error::encode),
            Self::MsgPack => rmp_serde::to_vec_named(value).map_err(Error::encode),
        }
    }

    /// Deserializes a value of type `T` from `reader`.
    ///
    /// Fails with [`Error::Decode`] when the input is malformed for this
    /// encoding.
    pub fn decode<T: DeserializeOwned>(self, reader: impl Read) -> Result<T, Error> {
        match self {
            Self::Json => serde_json::from_reader(reader).map_err(Error::decode),
            Self::MsgPack => rmp_serde::from_read(reader).map_err(Error::decode),
        }
    }

    /// The `Content-Type` header value responses carry under this encoding.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json;charset=UTF-8",
            Self::MsgPack => "application/x-msgpack",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq, Serialize)]
    struct Payload {
        name: String,
        count: i64,
        ratio: f64,
        active: bool,
    }

    fn sample() -> Payload {
        Payload { name: "alice".into(), count: 42, ratio: 0.5, active: true }
    }

    #[test]
    fn json_round_trip() {
        let bytes = Encoding::Json.encode(&sample()).unwrap();
        let back: Payload = Encoding::Json.decode(bytes.as_slice()).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn msgpack_round_trip() {
        let bytes = Encoding::MsgPack.encode(&sample()).unwrap();
        let back: Payload = Encoding::MsgPack.decode(bytes.as_slice()).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn msgpack_is_more_compact_than_json() {
        let json = Encoding::Json.encode(&sample()).unwrap();
        let mp = Encoding::MsgPack.encode(&sample()).unwrap();
        assert!(mp.len() < json.len());
    }

    #[test]
    fn malformed_input_is_a_decode_error() {
        let err = Encoding::Json.decode::<Payload>(&b"{not json"[..]).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));

        let err = Encoding::MsgPack.decode::<Payload>(&b"\xc1"[..]).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn content_types() {
        assert_eq!(Encoding::Json.content_type(), "application/json;charset=UTF-8");
        assert_eq!(Encoding::MsgPack.content_type(), "application/x-msgpack");
    }
}
