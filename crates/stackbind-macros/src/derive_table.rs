//! Implementation of the `#[derive(Table)]` macro.
//!
//! Named structs map to tables keyed by field name, tuple structs to
//! sequences keyed 1..=n. Skipped fields are left out when pushing and
//! filled with `Default::default()` when reading.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Index, parse_macro_input, parse_quote};

use crate::attrs::{MemberAttrs, TypeAttrs};

pub fn derive_table_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_table_inner(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Where a field lives in the table.
enum FieldKey {
    Name(String),
    Position(i64),
}

struct TableField {
    access: TokenStream2,
    ty: syn::Type,
    key: Option<FieldKey>,
}

pub(crate) fn derive_table_inner(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let attrs = TypeAttrs::from_attrs(&input.attrs)?;
    let vm_name = attrs.name.unwrap_or_else(|| name.to_string());

    let data = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Table can only be derived for structs",
            ));
        }
    };

    let fields = collect_fields(&data.fields)?;
    let exposed: Vec<&TableField> = fields.iter().filter(|f| f.key.is_some()).collect();
    let named = matches!(data.fields, Fields::Named(_));

    let mut push_generics = input.generics.clone();
    let mut read_generics = input.generics.clone();
    for field in &exposed {
        let ty = &field.ty;
        push_generics
            .make_where_clause()
            .predicates
            .push(parse_quote!(#ty: ::stackbind_core::Push));
        read_generics
            .make_where_clause()
            .predicates
            .push(parse_quote!(#ty: ::stackbind_core::FromStack));
    }
    for field in fields.iter().filter(|f| f.key.is_none()) {
        let ty = &field.ty;
        read_generics
            .make_where_clause()
            .predicates
            .push(parse_quote!(#ty: ::core::default::Default));
    }

    let push_fields = exposed.iter().map(|field| {
        let access = &field.access;
        let ty = &field.ty;
        let store = match &field.key {
            Some(FieldKey::Name(key)) => quote! { state.raw_set_field(-2, #key); },
            Some(FieldKey::Position(n)) => quote! { state.raw_set_index(-2, #n); },
            None => quote! {},
        };
        quote! {
            const {
                assert!(
                    <#ty as ::stackbind_core::Push>::SLOTS == 1,
                    "table fields must be single-slot values"
                )
            };
            state.push(self.#access);
            #store
        }
    });

    let read_fields = fields.iter().map(|field| {
        let ty = &field.ty;
        let value = match &field.key {
            Some(FieldKey::Name(key)) => quote! {
                {
                    state.raw_get_field(index, #key);
                    state.pop::<#ty>()?
                }
            },
            Some(FieldKey::Position(n)) => quote! {
                {
                    state.raw_get_index(index, #n);
                    state.pop::<#ty>()?
                }
            },
            None => quote! { ::core::default::Default::default() },
        };
        let access = &field.access;
        if named {
            quote! { #access: #value }
        } else {
            value
        }
    });

    let construct = match &data.fields {
        Fields::Named(_) => quote! { Self { #(#read_fields),* } },
        Fields::Unnamed(_) => quote! { Self(#(#read_fields),*) },
        Fields::Unit => quote! { Self },
    };

    let field_count = exposed.len();
    let (push_impl, push_ty, push_where) = push_generics.split_for_impl();
    let (read_impl, read_ty, read_where) = read_generics.split_for_impl();

    Ok(quote! {
        impl #push_impl ::stackbind_core::Push for #name #push_ty #push_where {
            fn push(self, state: &mut ::stackbind_core::State) {
                let (narr, nrec) = if #named { (0, #field_count) } else { (#field_count, 0) };
                if !state.create_table(narr, nrec) {
                    return;
                }
                #(#push_fields)*
            }
        }

        impl #read_impl ::stackbind_core::FromStack for #name #read_ty #read_where {
            #[allow(unused_variables)]
            fn from_stack(state: &mut ::stackbind_core::State, index: i32) -> ::core::option::Option<Self> {
                if state.type_of(index) != ::stackbind_core::TypeTag::Table {
                    return ::core::option::Option::None;
                }
                ::core::option::Option::Some(#construct)
            }

            fn type_name() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed(#vm_name)
            }
        }
    })
}

fn collect_fields(fields: &Fields) -> syn::Result<Vec<TableField>> {
    let mut out = Vec::new();
    let mut position = 0;
    for (i, field) in fields.iter().enumerate() {
        let attrs = MemberAttrs::from_attrs(&field.attrs)?;
        let access = match &field.ident {
            Some(ident) => quote! { #ident },
            None => {
                let index = Index::from(i);
                quote! { #index }
            }
        };
        let key = if attrs.skip {
            None
        } else if let Some(ident) = &field.ident {
            Some(FieldKey::Name(attrs.name.unwrap_or_else(|| ident.to_string())))
        } else {
            if attrs.name.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "tuple struct fields cannot be renamed",
                ));
            }
            position += 1;
            Some(FieldKey::Position(position))
        };
        out.push(TableField {
            access,
            ty: field.ty.clone(),
            key,
        });
    }
    Ok(out)
}
