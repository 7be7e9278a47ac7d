//! Implementation of the `#[methods]` attribute macro.
//!
//! Every `pub fn` of the annotated inherent impl is classified, in order:
//!
//! 1. `__dtor` becomes the native destructor (any visibility, never exposed)
//! 2. a catalogue name (`__add`, `__len`, ...) becomes a metamethod
//! 3. a function returning `Self` (or `Result<Self, E>`) without receiver or
//!    `Self`-typed parameter becomes the constructor, installed as `new`
//! 4. a function with a receiver or `Self`-typed first parameter becomes an
//!    instance method
//! 5. anything else becomes a static method
//!
//! Parameters are fetched with `FromArg`, except:
//! - `&mut State` receives the calling state
//! - `&str` and `&[T]` are fetched as `String` and `Vec<T>`
//! - `&X` and `&mut X` are fetched as `BoundRef<X>` and borrowed
//! - `Self` by value is cloned out of a `BoundRef<Self>`

use std::collections::HashSet;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, ReturnType, Signature, Type, Visibility,
    parse_macro_input,
};

use crate::attrs::{MemberAttrs, strip_helper_attrs};
use crate::validate::{
    is_state_param, metamethod, unwrap_result, validate_destructor, validate_metamethod,
};

pub fn methods_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[methods] takes no arguments",
        )
        .to_compile_error()
        .into();
    }

    let mut input = parse_macro_input!(item as ItemImpl);

    match methods_inner(&mut input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// How a declaration is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Constructor,
    Instance,
    Static,
    Metamethod(&'static str),
}

/// How one parameter is fetched and passed.
enum ParamPlan {
    /// The calling state.
    State,
    /// Fetched as `ty`, passed as is.
    Direct(Type),
    /// Fetched as an owned `ty`, passed by reference.
    Owned(TokenStream2),
    /// Fetched as `BoundRef<target>`, passed as a borrow.
    Borrow { target: Type, mutable: bool },
    /// Fetched as `BoundRef<target>`, passed as a clone.
    Cloned(Type),
}

/// How the return value is adjusted before being pushed.
enum ReturnPlan {
    Value,
    ToOwned,
    ResultToOwned,
}

pub(crate) fn methods_inner(input: &mut ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &input.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[methods] must be placed on an inherent impl block",
        ));
    }
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "#[methods] does not support generic impl blocks",
        ));
    }

    let self_ty = (*input.self_ty).clone();
    let type_ident = match &self_ty {
        Type::Path(path) if path.qself.is_none() => match path.path.segments.last() {
            Some(segment) => segment.ident.clone(),
            None => return Err(syn::Error::new_spanned(&self_ty, "expected a type name")),
        },
        _ => return Err(syn::Error::new_spanned(&self_ty, "expected a type name")),
    };
    let binder = Binder {
        self_ty: &self_ty,
        type_ident: &type_ident,
    };

    let mut entries = Vec::new();
    let mut names = HashSet::new();
    let mut destructor = None;
    let mut constructor: Option<Ident> = None;

    for item in &mut input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let attrs = MemberAttrs::from_attrs(&method.attrs)?;
        strip_helper_attrs(&mut method.attrs);

        if method.sig.ident == "__dtor" {
            validate_destructor(&method.sig)?;
            destructor = Some(method.sig.ident.clone());
            continue;
        }
        if attrs.skip || !matches!(method.vis, Visibility::Public(_)) {
            continue;
        }

        let classification = binder.classify(&method.sig)?;
        if classification == Classification::Constructor {
            if let Some(existing) = &constructor {
                return Err(syn::Error::new_spanned(
                    &method.sig.ident,
                    format!("only one constructor is allowed; `{existing}` is already the constructor"),
                ));
            }
            constructor = Some(method.sig.ident.clone());
        }
        if attrs.name.is_some()
            && matches!(
                classification,
                Classification::Constructor | Classification::Metamethod(_)
            )
        {
            return Err(syn::Error::new_spanned(
                &method.sig.ident,
                "constructors and metamethods cannot be renamed",
            ));
        }

        let name = match classification {
            Classification::Constructor => "new".to_string(),
            _ => attrs.name.unwrap_or_else(|| method.sig.ident.to_string()),
        };
        if !names.insert(name.clone()) {
            return Err(syn::Error::new_spanned(
                &method.sig.ident,
                format!("duplicate entry name `{name}`"),
            ));
        }
        entries.push(binder.entry(method, classification, &name)?);
    }

    let destructor = destructor.map(|ident| {
        quote! {
            fn destructor() -> ::core::option::Option<fn(&mut Self)> {
                ::core::option::Option::Some(<#self_ty>::#ident as fn(&mut Self))
            }
        }
    });

    Ok(quote! {
        #input

        impl ::stackbind_registry::BoundType for #self_ty {
            fn entries() -> ::std::vec::Vec<::stackbind_registry::BoundEntry> {
                ::std::vec![#(#entries),*]
            }

            #destructor
        }

        impl ::stackbind_core::Push for #self_ty {
            fn push(self, state: &mut ::stackbind_core::State) {
                ::stackbind_registry::push_bound(state, self);
            }
        }
    })
}

struct Binder<'a> {
    self_ty: &'a Type,
    type_ident: &'a Ident,
}

impl Binder<'_> {
    /// Whether `ty` names the bound type (`Self` or its own name).
    fn is_self(&self, ty: &Type) -> bool {
        match ty {
            Type::Path(path) if path.qself.is_none() => {
                path.path.is_ident("Self")
                    || path
                        .path
                        .segments
                        .last()
                        .is_some_and(|s| s.ident == *self.type_ident && s.arguments.is_empty())
            }
            Type::Paren(paren) => self.is_self(&paren.elem),
            _ => false,
        }
    }

    /// `Self`, `&Self` or `&mut Self`.
    fn is_self_typed(&self, ty: &Type) -> bool {
        match ty {
            Type::Reference(reference) => self.is_self(&reference.elem),
            _ => self.is_self(ty),
        }
    }

    fn classify(&self, sig: &Signature) -> syn::Result<Classification> {
        if sig.asyncness.is_some() {
            return Err(syn::Error::new_spanned(
                &sig.ident,
                "async functions cannot be bound",
            ));
        }
        if sig
            .generics
            .params
            .iter()
            .any(|p| !matches!(p, syn::GenericParam::Lifetime(_)))
        {
            return Err(syn::Error::new_spanned(
                &sig.generics,
                "generic functions cannot be bound",
            ));
        }

        let name = sig.ident.to_string();
        if let Some((variant, category)) = metamethod(&name) {
            validate_metamethod(&name, sig, category)?;
            return Ok(Classification::Metamethod(variant));
        }

        let has_receiver = sig.receiver().is_some();
        let typed: Vec<&Type> = sig
            .inputs
            .iter()
            .filter_map(|arg| match arg {
                FnArg::Typed(pat) if !is_state_param(&pat.ty) => Some(&*pat.ty),
                _ => None,
            })
            .collect();

        let returns_self = match &sig.output {
            ReturnType::Type(_, ty) => self.is_self(unwrap_result(ty)),
            ReturnType::Default => false,
        };
        if returns_self && !has_receiver && !typed.iter().any(|ty| self.is_self_typed(ty)) {
            return Ok(Classification::Constructor);
        }

        if has_receiver || typed.first().is_some_and(|ty| self.is_self_typed(ty)) {
            Ok(Classification::Instance)
        } else {
            Ok(Classification::Static)
        }
    }

    fn plan_param(&self, arg: &FnArg) -> syn::Result<ParamPlan> {
        let ty = match arg {
            FnArg::Receiver(receiver) => {
                if receiver.colon_token.is_some() {
                    return Err(syn::Error::new_spanned(
                        receiver,
                        "typed receivers are not supported; use self, &self or &mut self",
                    ));
                }
                let target: Type = syn::parse_quote!(Self);
                return Ok(match (&receiver.reference, &receiver.mutability) {
                    (Some(_), mutability) => ParamPlan::Borrow {
                        target,
                        mutable: mutability.is_some(),
                    },
                    (None, _) => ParamPlan::Cloned(target),
                });
            }
            FnArg::Typed(pat) => &*pat.ty,
        };

        if is_state_param(ty) {
            return Ok(ParamPlan::State);
        }
        match ty {
            Type::Reference(reference) => match &*reference.elem {
                Type::Path(path) if path.path.is_ident("str") => {
                    if reference.mutability.is_some() {
                        return Err(syn::Error::new_spanned(ty, "&mut str cannot be bound"));
                    }
                    Ok(ParamPlan::Owned(quote! { ::std::string::String }))
                }
                Type::Slice(slice) => {
                    if reference.mutability.is_some() {
                        return Err(syn::Error::new_spanned(ty, "mutable slices cannot be bound"));
                    }
                    let elem = &slice.elem;
                    Ok(ParamPlan::Owned(quote! { ::std::vec::Vec<#elem> }))
                }
                elem => Ok(ParamPlan::Borrow {
                    target: elem.clone(),
                    mutable: reference.mutability.is_some(),
                }),
            },
            _ if self.is_self(ty) => Ok(ParamPlan::Cloned(self.self_ty.clone())),
            _ => Ok(ParamPlan::Direct(ty.clone())),
        }
    }

    fn entry(
        &self,
        method: &ImplItemFn,
        classification: Classification,
        name: &str,
    ) -> syn::Result<TokenStream2> {
        let self_ty = self.self_ty;
        let ident = &method.sig.ident;

        let mut params = Vec::new();
        let mut guards = Vec::new();
        let mut call_args = Vec::new();
        for (i, arg) in method.sig.inputs.iter().enumerate() {
            let arg_ident = format_ident!("__arg{}", i);
            let guard_ident = format_ident!("__guard{}", i);
            match self.plan_param(arg)? {
                ParamPlan::State => call_args.push(quote! { __state }),
                ParamPlan::Direct(ty) => {
                    params.push(quote! { #arg_ident: #ty });
                    call_args.push(quote! { #arg_ident });
                }
                ParamPlan::Owned(ty) => {
                    params.push(quote! { #arg_ident: #ty });
                    call_args.push(quote! { &#arg_ident });
                }
                ParamPlan::Borrow { target, mutable } => {
                    params.push(quote! { #arg_ident: ::stackbind_core::BoundRef<#target> });
                    if mutable {
                        guards.push(quote! { let mut #guard_ident = #arg_ident.borrow_mut()?; });
                        call_args.push(quote! { &mut *#guard_ident });
                    } else {
                        guards.push(quote! { let #guard_ident = #arg_ident.borrow()?; });
                        call_args.push(quote! { &*#guard_ident });
                    }
                }
                ParamPlan::Cloned(target) => {
                    params.push(quote! { #arg_ident: ::stackbind_core::BoundRef<#target> });
                    call_args.push(quote! { #arg_ident.get()? });
                }
            }
        }

        let call = quote! { <#self_ty>::#ident(#(#call_args),*) };
        let closure_head = quote! {
            move |__state: &mut ::stackbind_core::State, #(#params),*|
        };

        if classification == Classification::Constructor {
            let body = match &method.sig.output {
                ReturnType::Type(_, ty) if !std::ptr::eq(unwrap_result(ty), &**ty) => quote! {
                    #call.map_err(::stackbind_core::Error::from_host)
                },
                _ => quote! { ::core::result::Result::Ok(#call) },
            };
            return Ok(quote! {
                ::stackbind_registry::BoundEntry::constructor(
                    ::stackbind_registry::constructor::<#self_ty, _, _>(
                        #closure_head -> ::stackbind_core::Result<#self_ty> {
                            #(#guards)*
                            #body
                        }
                    )
                )
            });
        }

        let ret = match return_plan(&method.sig.output) {
            ReturnPlan::Value => quote! { __ret },
            ReturnPlan::ToOwned => quote! { ::std::borrow::ToOwned::to_owned(__ret) },
            ReturnPlan::ResultToOwned => quote! { __ret.map(::std::borrow::ToOwned::to_owned) },
        };
        let function = quote! {
            ::stackbind_core::NativeFunction::new(
                #closure_head -> ::stackbind_core::Result<_> {
                    #(#guards)*
                    let __ret = #call;
                    ::core::result::Result::Ok(#ret)
                }
            )
        };

        Ok(match classification {
            Classification::Metamethod(variant) => {
                let variant = format_ident!("{}", variant);
                quote! {
                    ::stackbind_registry::BoundEntry::metamethod(
                        ::stackbind_core::Metamethod::#variant,
                        #function
                    )
                }
            }
            Classification::Instance => quote! {
                ::stackbind_registry::BoundEntry::instance(#name, #function)
            },
            _ => quote! {
                ::stackbind_registry::BoundEntry::static_method(#name, #function)
            },
        })
    }
}

fn return_plan(output: &ReturnType) -> ReturnPlan {
    let ReturnType::Type(_, ty) = output else {
        return ReturnPlan::Value;
    };
    if matches!(**ty, Type::Reference(_)) {
        return ReturnPlan::ToOwned;
    }
    let inner = unwrap_result(ty);
    if !std::ptr::eq(inner, &**ty) && matches!(inner, Type::Reference(_)) {
        return ReturnPlan::ResultToOwned;
    }
    ReturnPlan::Value
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn expand(mut input: ItemImpl) -> syn::Result<String> {
        methods_inner(&mut input).map(|tokens| tokens.to_string())
    }

    #[test]
    fn classifies_declarations() {
        let binder_ty: Type = parse_quote!(Counter);
        let ident: Ident = parse_quote!(Counter);
        let binder = Binder {
            self_ty: &binder_ty,
            type_ident: &ident,
        };
        let classify = |sig: Signature| binder.classify(&sig).unwrap();

        assert_eq!(classify(parse_quote!(fn new(v: i64) -> Self)), Classification::Constructor);
        assert_eq!(
            classify(parse_quote!(fn open(path: &str) -> Result<Counter, String>)),
            Classification::Constructor
        );
        assert_eq!(classify(parse_quote!(fn get(&self) -> i64)), Classification::Instance);
        assert_eq!(
            classify(parse_quote!(fn reset(state: &mut State, c: &mut Counter))),
            Classification::Instance
        );
        assert_eq!(
            classify(parse_quote!(fn merged(a: &Self, b: &Self) -> Self)),
            Classification::Instance
        );
        assert_eq!(classify(parse_quote!(fn limit() -> i64)), Classification::Static);
        assert_eq!(
            classify(parse_quote!(fn describe(n: i64, c: &Counter) -> String)),
            Classification::Static
        );
        assert_eq!(
            classify(parse_quote!(fn __len(&self) -> usize)),
            Classification::Metamethod("Len")
        );
    }

    #[test]
    fn generates_entries() {
        let out = expand(parse_quote! {
            impl Counter {
                pub fn new(start: i64) -> Self { Counter { value: start } }
                pub fn increment(&mut self, by: i64) -> i64 { self.value += by; self.value }
                #[stackbind(name = "label")]
                pub fn name(&self) -> &str { "counter" }
                pub fn limit() -> i64 { 100 }
                pub fn __len(&self) -> usize { self.value as usize }
                pub fn __dtor(&mut self) {}
                fn private(&self) {}
                #[stackbind(skip)]
                pub fn hidden(&self) {}
            }
        })
        .unwrap();

        assert!(out.contains("BoundEntry :: constructor"));
        assert!(out.contains("BoundEntry :: instance (\"increment\""));
        assert!(out.contains("BoundEntry :: instance (\"label\""));
        assert!(out.contains("BoundEntry :: static_method (\"limit\""));
        assert!(out.contains("Metamethod :: Len"));
        assert!(out.contains("fn destructor ()"));
        assert!(out.contains("borrow_mut ()"));
        assert!(out.contains("ToOwned :: to_owned (__ret)"));
        assert!(!out.contains("\"private\""));
        assert!(!out.contains("\"hidden\""));
        assert!(!out.contains("\"__dtor\""));
        assert!(!out.contains("stackbind (skip)"));
        assert!(out.contains("impl :: stackbind_core :: Push for Counter"));
    }

    #[test]
    fn fallible_constructor_maps_errors() {
        let out = expand(parse_quote! {
            impl Counter {
                pub fn new(start: i64) -> Result<Self, String> { Ok(Counter { value: start }) }
            }
        })
        .unwrap();
        assert!(out.contains("map_err (:: stackbind_core :: Error :: from_host)"));
    }

    #[test]
    fn state_and_borrowed_parameters() {
        let out = expand(parse_quote! {
            impl Counter {
                pub fn absorb(&mut self, state: &mut State, other: &Counter, tag: &str, items: &[i64]) {}
            }
        })
        .unwrap();
        assert!(out.contains("__arg0 : :: stackbind_core :: BoundRef < Self >"));
        assert!(out.contains("__arg2 : :: stackbind_core :: BoundRef < Counter >"));
        assert!(out.contains("__arg3 : :: std :: string :: String"));
        assert!(out.contains("__arg4 : :: std :: vec :: Vec < i64 >"));
        assert!(out.contains("(& mut * __guard0 , __state , & * __guard2 , & __arg3 , & __arg4)"));
    }

    #[test]
    fn second_constructor_is_an_error() {
        let err = expand(parse_quote! {
            impl Counter {
                pub fn new() -> Self { Counter { value: 0 } }
                pub fn zero() -> Counter { Counter { value: 0 } }
            }
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "only one constructor is allowed; `new` is already the constructor"
        );
    }

    #[test]
    fn colliding_entry_names_are_an_error() {
        let err = expand(parse_quote! {
            impl Counter {
                pub fn create(start: i64) -> Self { Counter { value: start } }
                pub fn new() -> i64 { 0 }
            }
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "duplicate entry name `new`");

        let err = expand(parse_quote! {
            impl Counter {
                #[stackbind(name = "get")]
                pub fn value(&self) -> i64 { self.value }
                #[stackbind(name = "get")]
                pub fn raw(&self) -> i64 { self.value }
            }
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "duplicate entry name `get`");

        let err = expand(parse_quote! {
            impl Counter {
                pub fn __len(&self) -> i64 { self.value }
                #[stackbind(name = "__len")]
                pub fn size(&self) -> i64 { self.value }
            }
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "duplicate entry name `__len`");
    }

    #[test]
    fn invalid_metamethod_is_an_error() {
        let err = expand(parse_quote! {
            impl Counter {
                pub fn __add(&self) -> Self { Counter { value: 0 } }
            }
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "__add must take exactly 2 parameters, found 1");
    }

    #[test]
    fn rejects_trait_and_generic_impls() {
        assert!(expand(parse_quote! { impl Clone for Counter {} }).is_err());
        assert!(expand(parse_quote! { impl<T> Holder<T> {} }).is_err());
    }
}
