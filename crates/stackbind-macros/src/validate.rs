//! Signature checks for operator-overload declarations.
//!
//! The receiver counts as a parameter; a `&mut State` parameter does not.

use proc_macro2::Span;
use syn::{FnArg, GenericArgument, PathArguments, ReturnType, Signature, Type};

/// Signature category of a metamethod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Unary,
    Binary,
    Length,
    ToString,
    Index,
    NewIndex,
}

impl Category {
    fn arity(self) -> usize {
        match self {
            Category::Unary | Category::Length | Category::ToString => 1,
            Category::Binary | Category::Index => 2,
            Category::NewIndex => 3,
        }
    }
}

/// The metamethod catalogue: slot name, `Metamethod` variant, category.
const CATALOGUE: &[(&str, &str, Category)] = &[
    ("__index", "Index", Category::Index),
    ("__newindex", "NewIndex", Category::NewIndex),
    ("__len", "Len", Category::Length),
    ("__tostring", "ToString", Category::ToString),
    ("__add", "Add", Category::Binary),
    ("__sub", "Sub", Category::Binary),
    ("__mul", "Mul", Category::Binary),
    ("__div", "Div", Category::Binary),
    ("__idiv", "IDiv", Category::Binary),
    ("__mod", "Mod", Category::Binary),
    ("__pow", "Pow", Category::Binary),
    ("__unm", "Unm", Category::Unary),
    ("__eq", "Eq", Category::Binary),
    ("__lt", "Lt", Category::Binary),
    ("__le", "Le", Category::Binary),
    ("__concat", "Concat", Category::Binary),
];

/// Look a metamethod up by name, returning its variant and category.
pub fn metamethod(name: &str) -> Option<(&'static str, Category)> {
    CATALOGUE
        .iter()
        .find(|(slot, _, _)| *slot == name)
        .map(|(_, variant, category)| (*variant, *category))
}

/// Whether `ty` is `&mut State` (any path ending in `State`).
pub fn is_state_param(ty: &Type) -> bool {
    match ty {
        Type::Reference(reference) if reference.mutability.is_some() => {
            matches!(&*reference.elem, Type::Path(p) if p.path.segments.last().is_some_and(|s| s.ident == "State"))
        }
        _ => false,
    }
}

/// Check `sig` against the rules for `category`.
pub fn validate_metamethod(name: &str, sig: &Signature, category: Category) -> syn::Result<()> {
    let params = sig
        .inputs
        .iter()
        .filter(|arg| match arg {
            FnArg::Receiver(_) => true,
            FnArg::Typed(pat) => !is_state_param(&pat.ty),
        })
        .count();
    let expected = category.arity();
    if params != expected {
        return Err(syn::Error::new_spanned(
            &sig.ident,
            format!(
                "{name} must take exactly {expected} parameter{}, found {params}",
                if expected == 1 { "" } else { "s" }
            ),
        ));
    }

    let output = match &sig.output {
        ReturnType::Type(_, ty) if !is_unit(ty) => Some(&**ty),
        _ => None,
    };
    match (category, output) {
        (Category::NewIndex, Some(ty)) => Err(syn::Error::new_spanned(
            ty,
            format!("{name} must not return a value"),
        )),
        (Category::NewIndex, None) => Ok(()),
        (_, None) => Err(syn::Error::new(
            span_of(sig),
            format!("{name} must return a value"),
        )),
        (Category::Length, Some(ty)) if !is_numeric(unwrap_result(ty)) => Err(
            syn::Error::new_spanned(ty, format!("{name} must return a number")),
        ),
        (Category::ToString, Some(ty)) if !is_string(unwrap_result(ty)) => Err(
            syn::Error::new_spanned(ty, format!("{name} must return a string")),
        ),
        _ => Ok(()),
    }
}

/// Check the destructor signature: `fn __dtor(&mut self)`.
pub fn validate_destructor(sig: &Signature) -> syn::Result<()> {
    let mut inputs = sig.inputs.iter();
    let receiver_ok = matches!(
        inputs.next(),
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_some()
    );
    let returns_unit = match &sig.output {
        ReturnType::Default => true,
        ReturnType::Type(_, ty) => is_unit(ty),
    };
    if !receiver_ok || inputs.next().is_some() || !returns_unit {
        return Err(syn::Error::new_spanned(
            &sig.ident,
            "__dtor must have the signature `fn __dtor(&mut self)`",
        ));
    }
    Ok(())
}

fn span_of(sig: &Signature) -> Span {
    sig.ident.span()
}

fn is_unit(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(t) if t.elems.is_empty())
}

/// The `T` of `Result<T, ..>`, or `ty` itself.
pub fn unwrap_result(ty: &Type) -> &Type {
    if let Type::Path(path) = ty
        && let Some(last) = path.path.segments.last()
        && last.ident == "Result"
        && let PathArguments::AngleBracketed(args) = &last.arguments
        && let Some(GenericArgument::Type(inner)) = args.args.first()
    {
        return inner;
    }
    ty
}

fn last_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) if path.qself.is_none() => {
            path.path.segments.last().map(|s| s.ident.to_string())
        }
        _ => None,
    }
}

fn is_numeric(ty: &Type) -> bool {
    matches!(
        last_ident(ty).as_deref(),
        Some(
            "i8" | "i16"
                | "i32"
                | "i64"
                | "isize"
                | "u8"
                | "u16"
                | "u32"
                | "u64"
                | "usize"
                | "f32"
                | "f64"
        )
    )
}

fn is_string(ty: &Type) -> bool {
    match ty {
        Type::Reference(reference) => last_ident(&reference.elem).as_deref() == Some("str"),
        _ => matches!(last_ident(ty).as_deref(), Some("String" | "Cow" | "VmString")),
    }
}
