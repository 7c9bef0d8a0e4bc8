use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DataEnum, DeriveInput, Fields, FieldsNamed, parse_quote};

use crate::attr::{Options, docs};

pub fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    if let Some(lifetime) = input.generics.lifetimes().next() {
        return Err(syn::Error::new_spanned(
            lifetime,
            "Describe cannot be derived for types with lifetime parameters",
        ));
    }

    let container = Options::parse(&input.attrs)?;
    let body = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => object(input, &container, fields)?,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Describe can only be derived for structs with named fields",
                ));
            }
        },
        Data::Enum(data) => enumeration(&container, data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Describe cannot be derived for unions",
            ));
        }
    };

    let ident = &input.ident;
    let mut generics = input.generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(parse_quote!(::chatloop::schema::Describe));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::chatloop::schema::Describe for #ident #ty_generics #where_clause {
            fn describe() -> ::chatloop::schema::Shape {
                #body
            }
        }
    })
}

fn object(
    input: &DeriveInput,
    container: &Options,
    fields: &FieldsNamed,
) -> syn::Result<TokenStream> {
    let mut entries = Vec::new();
    for field in &fields.named {
        let options = Options::parse(&field.attrs)?;
        if options.skip {
            continue;
        }

        let Some(ident) = &field.ident else {
            continue;
        };
        let name = options.rename.clone().unwrap_or_else(|| {
            let name = ident.unraw().to_string();
            container
                .rename_all
                .map_or_else(|| name.clone(), |rule| rule.apply_to_field(&name))
        });

        let ty = &field.ty;
        let constructor = if options.default || container.default {
            quote! { ::chatloop::schema::Field::of::<::core::option::Option<#ty>>(#name) }
        } else {
            quote! { ::chatloop::schema::Field::of::<#ty>(#name) }
        };
        let entry = match options.description.or_else(|| docs(&field.attrs)) {
            Some(description) => quote! { #constructor.with_description(#description) },
            None => constructor,
        };
        entries.push(entry);
    }

    let name = container
        .rename
        .clone()
        .unwrap_or_else(|| input.ident.unraw().to_string());
    Ok(quote! {
        ::chatloop::schema::Shape::Object(::chatloop::schema::ObjectShape::new::<Self>(
            #name,
            ::std::vec![#(#entries),*],
        ))
    })
}

fn enumeration(container: &Options, data: &DataEnum) -> syn::Result<TokenStream> {
    let mut names = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "Describe can only be derived for enums whose variants carry no data",
            ));
        }
        let options = Options::parse(&variant.attrs)?;
        if options.skip {
            continue;
        }
        let name = options.rename.unwrap_or_else(|| {
            let name = variant.ident.unraw().to_string();
            container
                .rename_all
                .map_or_else(|| name.clone(), |rule| rule.apply_to_variant(&name))
        });
        names.push(name);
    }

    Ok(quote! {
        let names: &[&'static str] = &[#(#names),*];
        ::chatloop::schema::Shape::Enum(::chatloop::schema::EnumShape::new(names.iter().copied()))
    })
}
