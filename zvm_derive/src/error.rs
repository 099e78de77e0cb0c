//! Derive macro for error types.
//!
//! Generates `std::fmt::Display`, `std::error::Error` and, for variants with a
//! `#[from]` field, `From<Inner>` implementations.
//!
//! # Usage
//!
//! ```ignore
//! use zvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum StorageError {
//!     #[error("i/o failure: {0}")]
//!     Io(#[from] std::io::Error),
//!
//!     #[error("record {key} truncated at byte {offset}")]
//!     Truncated { key: i32, offset: usize },
//!
//!     #[error("unsupported format")]
//!     Unsupported,
//! }
//! ```
//!
//! Messages may reference any subset of the fields; unreferenced fields are
//! bound but not formatted.

use proc_macro::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

/// A field annotated with `#[from]`.
struct FromField<'a> {
    variant: &'a syn::Ident,
    ty: &'a syn::Type,
    /// `None` for tuple fields, the field name for struct fields.
    name: Option<&'a syn::Ident>,
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    match &input.data {
        Data::Enum(data_enum) => {
            let mut display_arms = Vec::with_capacity(data_enum.variants.len());
            let mut from_fields = Vec::new();

            for variant in &data_enum.variants {
                let variant_name = &variant.ident;
                let error_msg = extract_error_message_from_attrs(
                    &variant.attrs,
                    &variant.ident,
                    &format!("variant `{variant_name}`"),
                )?;
                if let Some(field) = find_from_field(variant)? {
                    from_fields.push(field);
                }

                let arm = match &variant.fields {
                    Fields::Unit => quote! {
                        Self::#variant_name => write!(f, #error_msg),
                    },
                    Fields::Unnamed(fields) => {
                        let bindings: Vec<_> = (0..fields.unnamed.len())
                            .map(|i| format_ident!("f{}", i))
                            .collect();
                        let format_str =
                            convert_positional_to_named(&error_msg, fields.unnamed.len());
                        let used: Vec<_> = bindings
                            .iter()
                            .filter(|b| references_field(&format_str, &b.to_string()))
                            .collect();
                        quote! {
                            #[allow(unused_variables)]
                            Self::#variant_name(#(#bindings),*) => write!(f, #format_str, #(#used = #used),*),
                        }
                    }
                    Fields::Named(fields) => {
                        let bindings: Vec<_> = fields.named.iter().filter_map(|f| f.ident.as_ref()).collect();
                        let used: Vec<_> = bindings
                            .iter()
                            .filter(|b| references_field(&error_msg, &b.to_string()))
                            .collect();
                        quote! {
                            #[allow(unused_variables)]
                            Self::#variant_name { #(#bindings),* } => write!(f, #error_msg, #(#used = #used),*),
                        }
                    }
                };
                display_arms.push(arm);
            }

            let source_arms = from_fields.iter().map(|field| {
                let variant = field.variant;
                match field.name {
                    Some(ident) => quote! { Self::#variant { #ident, .. } => Some(#ident), },
                    None => quote! { Self::#variant(inner) => Some(inner), },
                }
            });

            let from_impls = from_fields.iter().map(|field| {
                let variant = field.variant;
                let ty = field.ty;
                let construct = match field.name {
                    Some(ident) => quote! { Self::#variant { #ident: value } },
                    None => quote! { Self::#variant(value) },
                };
                quote! {
                    impl #impl_generics ::std::convert::From<#ty> for #name #ty_generics #where_clause {
                        fn from(value: #ty) -> Self {
                            #construct
                        }
                    }
                }
            });

            let source_fn = if from_fields.is_empty() {
                quote! {}
            } else {
                quote! {
                    fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                        #[allow(unreachable_patterns)]
                        match self {
                            #(#source_arms)*
                            _ => None,
                        }
                    }
                }
            };

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        match self {
                            #(#display_arms)*
                        }
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
                    #source_fn
                }

                #(#from_impls)*
            })
        }
        Data::Struct(data_struct) => {
            let error_msg = extract_error_message_from_attrs(
                &input.attrs,
                &input.ident,
                &format!("type `{}`", input.ident),
            )?;

            let display_body = match &data_struct.fields {
                Fields::Unit => quote! { write!(f, #error_msg) },
                Fields::Named(fields) => {
                    let used: Vec<_> = fields
                        .named
                        .iter()
                        .filter_map(|f| f.ident.as_ref())
                        .filter(|ident| references_field(&error_msg, &ident.to_string()))
                        .collect();
                    quote! { write!(f, #error_msg, #(#used = self.#used),*) }
                }
                Fields::Unnamed(fields) => {
                    let format_str = convert_positional_to_named(&error_msg, fields.unnamed.len());
                    let (idents, indices): (Vec<_>, Vec<_>) = (0..fields.unnamed.len())
                        .map(|i| (format_ident!("f{}", i), syn::Index::from(i)))
                        .filter(|(ident, _)| references_field(&format_str, &ident.to_string()))
                        .unzip();
                    quote! { write!(f, #format_str, #(#idents = self.#indices),*) }
                }
            };

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        #display_body
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
            })
        }
        Data::Union(_) => Err(syn::Error::new_spanned(
            input,
            "Error derive does not support unions",
        )),
    }
}

/// Returns the `#[from]` field of a variant, if any.
///
/// `#[from]` is only accepted on variants with exactly one field.
fn find_from_field(variant: &syn::Variant) -> syn::Result<Option<FromField<'_>>> {
    let fields: Vec<&syn::Field> = match &variant.fields {
        Fields::Unit => return Ok(None),
        Fields::Unnamed(fields) => fields.unnamed.iter().collect(),
        Fields::Named(fields) => fields.named.iter().collect(),
    };

    let marked: Vec<&syn::Field> = fields
        .iter()
        .copied()
        .filter(|f| f.attrs.iter().any(|a| a.path().is_ident("from")))
        .collect();

    match marked.as_slice() {
        [] => Ok(None),
        [field] if fields.len() == 1 => Ok(Some(FromField {
            variant: &variant.ident,
            ty: &field.ty,
            name: field.ident.as_ref(),
        })),
        _ => Err(syn::Error::new_spanned(
            variant,
            "#[from] requires a variant with exactly one field",
        )),
    }
}

/// Extracts the message from an `#[error("...")]` attribute.
fn extract_error_message_from_attrs<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    for attr in attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        let Meta::List(meta_list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")] to describe the error",
            ));
        };
        let lit = syn::parse2::<Lit>(meta_list.tokens.clone()).map_err(|_| {
            syn::Error::new_spanned(
                &attr.meta,
                "failed to parse #[error] attribute; expected a string literal like #[error(\"stack overflow at pc {pc}\")]",
            )
        })?;
        if let Lit::Str(lit_str) = lit {
            return Ok(lit_str.value());
        }
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "invalid #[error] attribute: message must be a string literal",
        ));
    }

    Err(syn::Error::new_spanned(
        target,
        format!(
            "missing #[error(\"...\")] attribute on {target_desc}; every error variant must declare a display message"
        ),
    ))
}

/// Converts positional format args `{0}`, `{1:?}` to named args `{f0}`, `{f1:?}`.
fn convert_positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}

/// Whether the format string interpolates `name` (as `{name}` or `{name:...}`).
fn references_field(format_str: &str, name: &str) -> bool {
    format_str.contains(&format!("{{{name}}}")) || format_str.contains(&format!("{{{name}:"))
}
