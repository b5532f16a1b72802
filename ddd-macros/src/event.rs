use crate::utils::{apply_derives, ensure_pub_fields};
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Expr, Ident, Item, Result, Token, Type, parse::Parse, parse::ParseStream, parse_macro_input,
};

#[derive(Clone, Copy)]
pub(crate) enum EventRole {
    Domain,
    Integration,
}

impl EventRole {
    fn macro_name(self) -> &'static str {
        match self {
            EventRole::Domain => "#[domain_event]",
            EventRole::Integration => "#[integration_event]",
        }
    }
}

/// #[domain_event] / #[integration_event] 宏实现
/// - 合并默认派生：Debug, Clone, Serialize, Deserialize
/// - 集成事件确保字段：`event_id: Uuid`, `occurred_on: DateTime<Utc>`
/// - 生成 `Event`（KIND）及对应角色 trait 的实现
pub(crate) fn expand(role: EventRole, attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EventAttrConfig);
    let mut input = parse_macro_input!(item as Item);

    let Some(kind) = cfg.kind else {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            format!("{} requires `kind = \"...\"`", role.macro_name()),
        )
        .to_compile_error()
        .into();
    };
    if kind.value().trim().is_empty() {
        return syn::Error::new(kind.span(), "event kind must not be empty")
            .to_compile_error()
            .into();
    }

    let required: Vec<syn::Path> = vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];

    let (ident, generics) = match (&mut input, role) {
        (Item::Struct(st), EventRole::Integration) => {
            let syn::Fields::Named(fields_named) = &mut st.fields else {
                return syn::Error::new(
                    st.span(),
                    "#[integration_event] supports only named-field struct",
                )
                .to_compile_error()
                .into();
            };
            let uuid_ty: Type = syn::parse_quote! { ::ddd_domain::__private::Uuid };
            let time_ty: Type = syn::parse_quote! {
                ::ddd_domain::__private::DateTime<::ddd_domain::__private::Utc>
            };
            ensure_pub_fields(
                fields_named,
                &[("event_id", &uuid_ty), ("occurred_on", &time_ty)],
            );
            apply_derives(&mut st.attrs, required);
            (st.ident.clone(), st.generics.clone())
        }
        (Item::Struct(st), EventRole::Domain) => {
            apply_derives(&mut st.attrs, required);
            (st.ident.clone(), st.generics.clone())
        }
        (Item::Enum(en), EventRole::Domain) => {
            apply_derives(&mut en.attrs, required);
            (en.ident.clone(), en.generics.clone())
        }
        (other, role) => {
            let expected = match role {
                EventRole::Domain => "struct or enum",
                EventRole::Integration => "struct",
            };
            return syn::Error::new(
                other.span(),
                format!("{} can only be used on {expected}", role.macro_name()),
            )
            .to_compile_error()
            .into();
        }
    };

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let role_impl = match role {
        EventRole::Domain => quote! {
            impl #impl_generics ::ddd_domain::domain_event::DomainEvent for #ident #ty_generics #where_clause {}
        },
        EventRole::Integration => quote! {
            impl #impl_generics ::ddd_domain::domain_event::IntegrationEvent for #ident #ty_generics #where_clause {
                fn event_id(&self) -> ::ddd_domain::__private::Uuid {
                    self.event_id
                }

                fn occurred_on(&self) -> ::ddd_domain::__private::DateTime<::ddd_domain::__private::Utc> {
                    self.occurred_on
                }
            }
        },
    };

    let out = quote! {
        #input

        impl #impl_generics ::ddd_domain::domain_event::Event for #ident #ty_generics #where_clause {
            const KIND: &'static str = #kind;
        }

        #role_impl
    };

    TokenStream::from(out)
}

// 解析宏键值参数：kind = "<str>"
struct EventAttrConfig {
    kind: Option<syn::LitStr>,
}

impl Parse for EventAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut kind: Option<syn::LitStr> = None;

        if input.is_empty() {
            return Ok(Self { kind });
        }

        let pairs: Punctuated<EventAttrKv, Token![,]> =
            Punctuated::<EventAttrKv, Token![,]>::parse_terminated(input)?;

        for kv in pairs {
            match kv.key.to_string().as_str() {
                "kind" => {
                    if kind.is_some() {
                        return Err(syn::Error::new(
                            kv.key.span(),
                            "duplicate key 'kind' in attribute",
                        ));
                    }
                    let lit = match kv.value {
                        Expr::Lit(syn::ExprLit {
                            lit: syn::Lit::Str(lit),
                            ..
                        }) => lit,
                        other => {
                            return Err(syn::Error::new(
                                other.span(),
                                "expected string literal for 'kind'",
                            ));
                        }
                    };
                    kind = Some(lit);
                }
                _ => {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "unknown key; expected 'kind'",
                    ));
                }
            }
        }

        Ok(Self { kind })
    }
}

struct EventAttrKv {
    key: Ident,
    #[allow(dead_code)]
    eq: Token![=],
    value: Expr,
}

impl Parse for EventAttrKv {
    fn parse(input: ParseStream) -> Result<Self> {
        Ok(Self {
            key: input.parse()?,
            eq: input.parse()?,
            value: input.parse()?,
        })
    }
}
