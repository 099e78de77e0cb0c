//! Derive macros for the zvm crate.
//!
//! Provides:
//! - `#[derive(BinaryCodec)]` - little-endian binary encoding for plain structs
//! - `#[derive(Error)]` - `Display`, `Error` and `From` boilerplate for error enums

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` by encoding every field in declaration order.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `Error` for error types.
///
/// Fields marked `#[from]` also get a `From` conversion and are reported
/// through `Error::source`.
#[proc_macro_derive(Error, attributes(error, from))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
