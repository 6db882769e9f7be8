//! Codec module - payload serialization.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde`, used for structured
//!   backchannel replies
//!
//! Codecs are marker structs with static methods rather than trait objects.

mod msgpack;

pub use msgpack::MsgPackCodec;
