//! Binary bundle codec.
//!
//! The bundle is the portable on-disk form of a UI document: a fixed header,
//! a deduplicated string table, and a flat array of element records. All
//! integers are big-endian on the wire regardless of host endianness.
//!
//! `decode` validates magic, version, declared limits, checksum, and every
//! type tag before any record is materialized; a corrupt bundle is rejected
//! whole, never partially applied. `encode` performs the inverse and derives
//! every header count from the actual arrays, so a mismatched header cannot
//! be emitted.

mod decode;
mod encode;
mod types;

pub use decode::decode;
pub use encode::encode;
pub use types::{
    Bundle, CompressionKind, DecodeOptions, DecodePolicy, Edges4, ElementRecord, ElementTag,
    FORMAT_VERSION, HEADER_LEN, MAGIC, NO_NAME, PropertyRecord, PropertyTag, PropertyValue,
    payload_checksum,
};
