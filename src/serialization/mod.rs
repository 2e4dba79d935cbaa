//! Binary run records.
//!
//! A record is the postcard encoding of [`RunRecord`] followed by a
//! little-endian CRC32C of those bytes. Decoding checks the trailer before
//! touching the payload.

mod record;

pub use record::{
    RunRecord,
    SerializationError,
    to_bytes,
    from_bytes,
    write_to_path,
    read_from_path,
};
