//! Implementation of the `#[derive(Any)]` macro.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

use crate::attrs::TypeAttrs;

pub fn derive_any_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_any_inner(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

pub(crate) fn derive_any_inner(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Any cannot be derived for generic types",
        ));
    }

    let name = &input.ident;
    let attrs = TypeAttrs::from_attrs(&input.attrs)?;
    let vm_name = attrs.name.unwrap_or_else(|| name.to_string());

    Ok(quote! {
        impl ::stackbind_core::Any for #name {
            fn type_name() -> &'static str {
                #vm_name
            }
        }
    })
}
