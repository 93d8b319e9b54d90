use std::ops::RangeInclusive;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
  parse::{Parse, ParseStream},
  parse_macro_input,
  punctuated::Punctuated,
  token::Comma,
  DeriveInput, Ident, LitInt,
};

mod manifest;

/// Marks a struct or enum as storable in archetype columns.
#[proc_macro_derive(Component)]
pub fn component(input: TokenStream) -> TokenStream {
  let input = parse_macro_input!(input as DeriveInput);

  let ecs_path = manifest::ecs_path();

  let name = input.ident;
  let (impl_generics, type_generics, where_clause) = input.generics.split_for_impl();

  quote! {
    impl #impl_generics #ecs_path::components::Component for #name #type_generics #where_clause {}
  }
  .into()
}

/// `macro_ident, start, end, Ident, ...`
struct AllTuples {
  macro_ident: Ident,
  arities: RangeInclusive<usize>,
  idents: Vec<Ident>,
}

impl Parse for AllTuples {
  fn parse(input: ParseStream) -> syn::Result<Self> {
    let macro_ident = input.parse::<Ident>()?;
    input.parse::<Comma>()?;
    let start = input.parse::<LitInt>()?;
    input.parse::<Comma>()?;
    let end = input.parse::<LitInt>()?;
    input.parse::<Comma>()?;
    let idents = Punctuated::<Ident, Comma>::parse_separated_nonempty(input)?;

    let arities: RangeInclusive<usize> = start.base10_parse()?..=end.base10_parse()?;
    if arities.is_empty() {
      return Err(syn::Error::new(end.span(), "end must not be smaller than start"));
    }

    Ok(AllTuples {
      macro_ident,
      arities,
      idents: idents.into_iter().collect(),
    })
  }
}

impl AllTuples {
  /// Identifiers of the `i`th element, grouped when there is more than one.
  fn element(&self, i: usize) -> TokenStream2 {
    let idents = self.idents.iter().map(|ident| format_ident!("{}{}", ident, i));
    if self.idents.len() == 1 {
      quote! { #(#idents)* }
    } else {
      quote! { (#(#idents),*) }
    }
  }

  fn expand(&self) -> TokenStream2 {
    let macro_ident = &self.macro_ident;
    let invocations = self.arities.clone().map(|arity| {
      let elements = (0..arity).map(|i| self.element(i));
      quote! { #macro_ident!(#(#elements),*); }
    });

    quote! { #(#invocations)* }
  }
}

/// Invokes `macro_ident!` once per arity in `start..=end` with the generated
/// identifiers, e.g. `all_tuples!(m, 0, 2, F)` expands to `m!(); m!(F0); m!(F0, F1);`.
#[proc_macro]
pub fn all_tuples(input: TokenStream) -> TokenStream {
  parse_macro_input!(input as AllTuples).expand().into()
}

#[cfg(test)]
mod test {
  use quote::quote;

  use super::AllTuples;

  fn expand(input: &str) -> String {
    syn::parse_str::<AllTuples>(input).unwrap().expand().to_string()
  }

  #[test]
  fn single_ident() {
    assert_eq!(
      expand("m, 0, 2, F"),
      quote! { m!(); m!(F0); m!(F0, F1); }.to_string()
    );
  }

  #[test]
  fn grouped_idents() {
    assert_eq!(
      expand("m, 1, 2, P, S"),
      quote! { m!((P0, S0)); m!((P0, S0), (P1, S1)); }.to_string()
    );
  }

  #[test]
  fn rejects_reversed_range() {
    assert!(syn::parse_str::<AllTuples>("m, 3, 1, F").is_err());
  }
}
