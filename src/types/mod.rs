//! Shared encoding primitives.
//!
//! - [`encoding`]: `Encode`/`Decode` traits used by the program and record file formats
//!
//! Structs composed of fixed-width fields derive both traits with
//! `#[derive(zvm_derive::BinaryCodec)]`.

pub mod encoding;
