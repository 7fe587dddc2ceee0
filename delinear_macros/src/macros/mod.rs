use crate::helpers::{non_enum_error, non_unit_variant_error};
use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Fields};

pub fn mnemonic_inner(ast: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let variants = match &ast.data {
        Data::Enum(v) => &v.variants,
        _ => return Err(non_enum_error()),
    };

    let mut display_arms = Vec::new();
    let mut parse_arms = Vec::new();
    for variant in variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(non_unit_variant_error(variant.span()));
        }
        let ident = &variant.ident;
        let output = ident.to_string().to_lowercase();

        display_arms.push(quote! { #name::#ident => f.pad(#output) });
        parse_arms.push(quote! { #output => Ok(#name::#ident) });
    }
    parse_arms.push(quote! { _ => Err(std::io::Error::from(std::io::ErrorKind::InvalidData)) });

    Ok(quote! {
        impl #impl_generics ::core::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::result::Result<(), ::core::fmt::Error> {
                match *self {
                    #(#display_arms),*
                }
            }
        }

        impl #impl_generics ::core::str::FromStr for #name #ty_generics #where_clause {
            type Err = std::io::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    #(#parse_arms),*
                }
            }
        }
    })
}
