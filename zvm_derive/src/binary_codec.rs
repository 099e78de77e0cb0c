//! Derive macro for fixed-layout binary encoding.
//!
//! Generates `Encode` and `Decode` implementations for structs whose fields
//! all implement the traits themselves.
//!
//! # Supported Types
//!
//! - **Named structs**: `struct Header { format_id: i32, entry_count: i32 }`
//! - **Tuple structs**: `struct Word(u32)`
//!
//! Enums, unions and unit structs are rejected. Variable-length data (the
//! heap records) carries its own length prefix and is encoded by hand.
//!
//! # Binary Format
//!
//! Fields are written in declaration order with no padding, tags or length
//! prefixes; integers are little-endian and fixed-width.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Derives `Encode` and `Decode` for a struct.
///
/// # Example
///
/// ```ignore
/// use zvm_derive::BinaryCodec;
///
/// #[derive(BinaryCodec)]
/// pub struct Instruction {
///     pub word: u32,
///     pub value: i32,
/// }
/// ```
///
/// expands to an `Encode` impl writing `word` then `value`, and a `Decode`
/// impl reading them back in the same order.
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields) => {
                let field_names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                (
                    quote! {
                        #( crate::types::encoding::Encode::encode(&self.#field_names, out); )*
                    },
                    quote! {
                        Ok(Self {
                            #( #field_names: crate::types::encoding::Decode::decode(input)?, )*
                        })
                    },
                )
            }
            Fields::Unnamed(fields) => {
                let field_indices: Vec<_> =
                    (0..fields.unnamed.len()).map(syn::Index::from).collect();
                let decode_fields = field_indices.iter().map(|_| {
                    quote! { crate::types::encoding::Decode::decode(input)?, }
                });
                (
                    quote! {
                        #( crate::types::encoding::Encode::encode(&self.#field_indices, out); )*
                    },
                    quote! {
                        Ok(Self( #(#decode_fields)* ))
                    },
                )
            }
            Fields::Unit => {
                return syn::Error::new_spanned(&input, "BinaryCodec derive needs at least one field")
                    .to_compile_error()
                    .into();
            }
        },
        Data::Enum(_) | Data::Union(_) => {
            return syn::Error::new_spanned(&input, "BinaryCodec derive only supports structs")
                .to_compile_error()
                .into();
        }
    };

    let expanded = quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    };

    TokenStream::from(expanded)
}
