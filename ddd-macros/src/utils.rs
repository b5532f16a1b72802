use std::collections::HashSet;
use syn::punctuated::Punctuated;
use syn::{Attribute, Field, FieldsNamed, Path, Token, Type};

/// 把宏要求的 derive 与用户已写的 derive 合并为一个属性，置于最前；
/// 以末段名去重（`Serialize` 与 `serde::Serialize` 视为同一项），要求项优先。
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<Path>) {
    let mut user_derives: Vec<Path> = Vec::new();
    attrs.retain(|attr| {
        if !attr.path().is_ident("derive") {
            return true;
        }
        if let Ok(list) = attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated) {
            user_derives.extend(list);
        }
        false
    });

    let mut seen = HashSet::new();
    let merged: Vec<Path> = required
        .into_iter()
        .chain(user_derives)
        .filter(|p| {
            let key = p
                .segments
                .last()
                .map(|s| s.ident.to_string())
                .unwrap_or_default();
            seen.insert(key)
        })
        .collect();

    attrs.insert(0, syn::parse_quote!(#[derive(#(#merged),*)]));
}

/// 缺失的必需字段以 `pub` 追加在最前；用户已声明的同名字段保持原样
pub(crate) fn ensure_pub_fields(fields: &mut FieldsNamed, required: &[(&str, &Type)]) {
    let declared = |name: &str| {
        fields
            .named
            .iter()
            .any(|f| f.ident.as_ref().is_some_and(|i| i == name))
    };

    let mut named: Punctuated<Field, Token![,]> = required
        .iter()
        .filter(|&&(name, _)| !declared(name))
        .map(|(name, ty)| {
            let ident = syn::Ident::new(name, proc_macro2::Span::call_site());
            let field: Field = syn::parse_quote! { pub #ident: #ty };
            field
        })
        .collect();
    named.extend(std::mem::take(&mut fields.named));
    fields.named = named;
}
