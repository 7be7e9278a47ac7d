//! Attribute parsing utilities for stackbind macros.

use syn::{Attribute, LitStr};

/// Parsed `#[stackbind(...)]` attributes on a type.
#[derive(Debug, Default)]
pub struct TypeAttrs {
    /// Override name for the VM (default: Rust type name)
    pub name: Option<String>,
}

/// Parsed `#[stackbind(...)]` attributes on a field or method.
#[derive(Debug, Default)]
pub struct MemberAttrs {
    /// Override key or entry name
    pub name: Option<String>,
    /// Leave the member out
    pub skip: bool,
}

impl TypeAttrs {
    /// Parse attributes from a list of `#[stackbind(...)]` attributes.
    pub fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut result = Self::default();

        for attr in attrs {
            if !attr.path().is_ident("stackbind") {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let value: LitStr = meta.value()?.parse()?;
                    result.name = Some(value.value());
                } else {
                    return Err(meta.error(format!(
                        "unknown stackbind attribute: {}",
                        meta.path.get_ident().map(|i| i.to_string()).unwrap_or_default()
                    )));
                }
                Ok(())
            })?;
        }

        Ok(result)
    }
}

impl MemberAttrs {
    /// Parse attributes from a list of `#[stackbind(...)]` attributes.
    pub fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut result = Self::default();

        for attr in attrs {
            if !attr.path().is_ident("stackbind") {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let value: LitStr = meta.value()?.parse()?;
                    result.name = Some(value.value());
                } else if meta.path.is_ident("skip") {
                    result.skip = true;
                } else {
                    return Err(meta.error(format!(
                        "unknown stackbind member attribute: {}",
                        meta.path.get_ident().map(|i| i.to_string()).unwrap_or_default()
                    )));
                }
                Ok(())
            })?;
        }

        Ok(result)
    }
}

/// Drop `#[stackbind(...)]` helper attributes.
pub fn strip_helper_attrs(attrs: &mut Vec<Attribute>) {
    attrs.retain(|attr| !attr.path().is_ident("stackbind"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn type_name_override() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[stackbind(name = "Vec2")])];
        let parsed = TypeAttrs::from_attrs(&attrs).unwrap();
        assert_eq!(parsed.name.as_deref(), Some("Vec2"));
    }

    #[test]
    fn member_flags() {
        let attrs: Vec<Attribute> = vec![
            parse_quote!(#[doc = "ignored"]),
            parse_quote!(#[stackbind(skip)]),
            parse_quote!(#[stackbind(name = "x")]),
        ];
        let parsed = MemberAttrs::from_attrs(&attrs).unwrap();
        assert!(parsed.skip);
        assert_eq!(parsed.name.as_deref(), Some("x"));
    }

    #[test]
    fn unknown_attribute_is_an_error() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[stackbind(hidden)])];
        let err = MemberAttrs::from_attrs(&attrs).unwrap_err();
        assert!(err.to_string().contains("unknown stackbind member attribute: hidden"));
    }

    #[test]
    fn strips_only_helpers() {
        let mut attrs: Vec<Attribute> = vec![
            parse_quote!(#[inline]),
            parse_quote!(#[stackbind(skip)]),
        ];
        strip_helper_attrs(&mut attrs);
        assert_eq!(attrs.len(), 1);
        assert!(attrs[0].path().is_ident("inline"));
    }
}
