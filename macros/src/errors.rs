// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, Parser};
use syn::{
    Attribute, DeriveInput, Field, Fields, GenericArgument, Ident, PathArguments, Type,
    parse_macro_input, parse_quote,
};

/// Returns `T` for a field typed `Box<T>` where `T` is not a trait object.
fn boxed_concrete_type(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.first()?;
    if segment.ident != "Box" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(Type::TraitObject(_)) => None,
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn field_named(field: &Field, name: &str) -> bool {
    field.ident.as_ref().is_some_and(|ident| ident == name)
}

pub fn trace_error(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(item as DeriveInput);
    let syn::Data::Enum(enum_data) = &mut input.data else {
        panic!("#[trace_error] only applies to enums")
    };
    for variant in enum_data.variants.iter_mut() {
        if matches!(variant.fields, Fields::Unit) {
            variant.fields = Fields::Named(syn::FieldsNamed::parse.parse2(quote! {{}}).unwrap());
        }
        let Fields::Named(fields) = &mut variant.fields else {
            panic!("variant {} must use named fields", variant.ident)
        };
        let location = Field::parse_named
            .parse2(quote! {#[snafu(implicit)] _location: ::snafu::Location})
            .unwrap();
        fields.named.push(location);

        let source = fields
            .named
            .iter_mut()
            .find(|f| field_named(f, "source") || field_named(f, "error"));
        let Some(source) = source else {
            continue;
        };
        let attr: Attribute = match boxed_concrete_type(&source.ty) {
            Some(inner) => parse_quote! {#[snafu(source(from(#inner, Box::new)))]},
            None => parse_quote! {#[snafu(source)]},
        };
        source.attrs.push(attr);
    }
    quote! { #input }.into()
}

fn trace_arm(name: &Ident, variant: &syn::Variant) -> TokenStream2 {
    let Fields::Named(fields) = &variant.fields else {
        panic!("variant {} must use named fields", variant.ident)
    };
    let cfg_attrs = variant
        .attrs
        .iter()
        .filter(|attr| attr.path().is_ident("cfg"))
        .collect::<Vec<_>>();
    let variant_name = &variant.ident;
    if fields.named.iter().any(|f| field_named(f, "source")) {
        quote! {
            #(#cfg_attrs)*
            #name::#variant_name { _location, source, .. } => {
                let level = source.debug_trace(f)?;
                writeln!(f, "{level}: {self}, at {_location}")?;
                Ok(level + 1)
            }
        }
    } else if fields.named.iter().any(|f| field_named(f, "error")) {
        quote! {
            #(#cfg_attrs)*
            #name::#variant_name { _location, error, .. } => {
                writeln!(f, "0: {error}")?;
                writeln!(f, "1: {self}, at {_location}")?;
                Ok(2)
            }
        }
    } else {
        quote! {
            #(#cfg_attrs)*
            #name::#variant_name { _location, .. } => {
                writeln!(f, "0: {self}, at {_location}")?;
                Ok(1)
            }
        }
    }
}

pub fn derive_debug_trace(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let syn::Data::Enum(enum_data) = &input.data else {
        panic!("DebugTrace can only be derived for enums")
    };
    let arms = enum_data.variants.iter().map(|v| trace_arm(name, v));

    quote! {
        impl DebugTrace for #name {
            #[inline(never)]
            fn debug_trace(
                &self,
                f: &mut ::std::fmt::Formatter<'_>,
            ) -> ::std::result::Result<u32, ::std::fmt::Error> {
                match self {
                    #(#arms)*
                }
            }
        }

        impl ::std::fmt::Debug for #name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                writeln!(f, "{self}")?;
                DebugTrace::debug_trace(self, f)?;
                Ok(())
            }
        }
    }
    .into()
}
