use darling::ast::Data;
use darling::util::Ignored;
use darling::{FromDeriveInput, FromField};
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

use proc_macro::TokenStream;

#[derive(FromField)]
#[darling(attributes(field))]
struct FieldReceiver {
    ident: Option<syn::Ident>,
    #[darling(default)]
    skip: bool,
    #[darling(default)]
    rename: Option<String>,
}

#[derive(FromDeriveInput)]
#[darling(supports(struct_named))]
struct FieldSetReceiver {
    ident: syn::Ident,
    generics: syn::Generics,
    data: Data<Ignored, FieldReceiver>,
}

/// Derives `FieldSet` and `FieldSetValue` for a syntax structure.
///
/// Every named field contributes its value under its own name, or under
/// `#[field(rename = "...")]`. Fields marked `#[field(skip)]` are left out.
#[proc_macro_derive(FieldSet, attributes(field))]
pub fn derive_field_set(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let receiver = match FieldSetReceiver::from_derive_input(&input) {
        Ok(receiver) => receiver,
        Err(e) => return TokenStream::from(e.write_errors()),
    };

    let name = &receiver.ident;
    let (impl_generics, ty_generics, where_clause) = receiver.generics.split_for_impl();

    let Some(fields) = receiver.data.take_struct() else {
        unreachable!("FieldSet can only be derived for structs with named fields")
    };

    let collected = fields
        .fields
        .into_iter()
        .filter(|f| !f.skip)
        .filter_map(|f| {
            let ident = f.ident?;
            let label = f.rename.unwrap_or_else(|| ident.to_string());

            Some(quote! {
                crate::structs::fields::FieldSetValue::collect_into(
                    &self.#ident,
                    &format!("{}{}", prefix, #label),
                    out,
                );
            })
        })
        .collect::<Vec<_>>();

    let expanded = quote! {
        impl #impl_generics crate::structs::fields::FieldSet for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn collect_fields(&self, prefix: &str, out: &mut crate::structs::fields::FieldList) {
                #( #collected )*
            }
        }

        impl #impl_generics crate::structs::fields::FieldSetValue for #name #ty_generics #where_clause {
            fn collect_into(&self, name: &str, out: &mut crate::structs::fields::FieldList) {
                crate::structs::fields::FieldSet::collect_fields(self, &format!("{}.", name), out);
            }
        }
    };

    TokenStream::from(expanded)
}
