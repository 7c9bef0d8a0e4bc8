use convert_case::{Case, Casing};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::{FnArg, Ident, ItemFn, LitStr, Pat, PatIdent, Token};

use crate::attr::{Options, docs};

/// Arguments of the `#[function(...)]` attribute.
pub struct FunctionArgs {
    description: Option<String>,
    rename: Option<String>,
    approval: bool,
}

impl Parse for FunctionArgs {
    /// Supports:
    /// - `description = "..."`: description for the model, defaults to the doc comment
    /// - `rename = "..."`: name for the model, defaults to the function name
    /// - `approval`: calls must be approved
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = Self {
            description: None,
            rename: None,
            approval: false,
        };

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            match ident.to_string().as_str() {
                "approval" => args.approval = true,
                "description" | "rename" => {
                    let _: Token![=] = input.parse()?;
                    let value: LitStr = input.parse()?;
                    if ident == "description" {
                        args.description = Some(value.value());
                    } else {
                        args.rename = Some(value.value());
                    }
                }
                _ => {
                    return Err(syn::Error::new_spanned(
                        ident,
                        "unknown attribute. Supported: description, rename, approval",
                    ));
                }
            }

            if input.peek(Token![,]) {
                let _: Token![,] = input.parse()?;
            }
        }

        Ok(args)
    }
}

pub fn expand(args: FunctionArgs, mut item: ItemFn) -> syn::Result<TokenStream> {
    if item.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(&item.sig, "functions must be async"));
    }
    if !item.sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.sig.generics,
            "functions cannot have generic or lifetime parameters",
        ));
    }

    let fn_name = item.sig.ident.clone();
    let base_name = fn_name.unraw().to_string();
    let tool_name = args.rename.unwrap_or_else(|| base_name.clone());
    let description = args
        .description
        .or_else(|| docs(&item.attrs))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &fn_name,
                "a description is required: add `description = \"...\"` or a doc comment",
            )
        })?;
    let approval = args.approval;

    let vis = item.vis.clone();
    let tool_struct = format_ident!("{}", base_name.to_case(Case::Pascal));
    let args_struct = format_ident!("{}Args", tool_struct);
    let args_struct_name = args_struct.to_string();

    let mut params = Vec::new();
    let mut fields = Vec::new();
    let mut entries = Vec::new();
    for input in &mut item.sig.inputs {
        let FnArg::Typed(pat_type) = input else {
            return Err(syn::Error::new_spanned(
                input,
                "self parameters are not supported in functions",
            ));
        };
        let Pat::Ident(PatIdent { ident, .. }) = &*pat_type.pat else {
            return Err(syn::Error::new_spanned(
                &pat_type.pat,
                "parameters must be plain identifiers",
            ));
        };
        let ident = ident.clone();

        let options = Options::parse(&pat_type.attrs)?;
        if options.skip {
            return Err(syn::Error::new_spanned(&ident, "parameters cannot be skipped"));
        }
        // `describe` is only meaningful to this macro and must not reach the compiler.
        pat_type.attrs.retain(|attr| !attr.path().is_ident("describe"));

        let name = options
            .rename
            .unwrap_or_else(|| ident.unraw().to_string().to_case(Case::Snake));
        let ty = &*pat_type.ty;

        fields.push(quote! {
            #[serde(rename = #name)]
            #ident: #ty
        });
        let field = quote! { ::chatloop::schema::Field::of::<#ty>(#name) };
        entries.push(match options.description {
            Some(description) => quote! { #field.with_description(#description) },
            None => field,
        });
        params.push(ident);
    }

    let args_doc = format!("Arguments of [`{base_name}`].");
    let tool_doc = format!("`{tool_name}`: {description}");

    Ok(quote! {
        #item

        #[doc = #args_doc]
        #[derive(::chatloop::__hidden::serde::Deserialize)]
        #[serde(crate = "::chatloop::__hidden::serde", deny_unknown_fields)]
        #[allow(non_snake_case)]
        #vis struct #args_struct {
            #(#fields,)*
        }

        impl ::chatloop::schema::Describe for #args_struct {
            fn describe() -> ::chatloop::schema::Shape {
                ::chatloop::schema::Shape::Object(
                    ::chatloop::schema::ObjectShape::new::<Self>(
                        #args_struct_name,
                        ::std::vec![#(#entries),*],
                    )
                    .require_all(),
                )
            }
        }

        #[doc = #tool_doc]
        #[derive(
            ::core::default::Default,
            ::core::fmt::Debug,
            ::core::clone::Clone,
            ::core::marker::Copy
        )]
        #vis struct #tool_struct;

        impl ::chatloop::Tool for #tool_struct {
            fn name(&self) -> ::chatloop::__hidden::CowStr {
                ::chatloop::__hidden::CowStr::Borrowed(#tool_name)
            }
            fn description(&self) -> ::chatloop::__hidden::CowStr {
                ::chatloop::__hidden::CowStr::Borrowed(#description)
            }
            fn requires_approval(&self) -> bool {
                #approval
            }
            type Arguments = #args_struct;

            async fn call(&self, arguments: Self::Arguments) -> ::chatloop::Result {
                let #args_struct { #(#params),* } = arguments;
                let output = #fn_name(#(#params),*).await?;
                ::chatloop::json(&output)
            }
        }
    })
}
