use proc_macro2::Span;

pub fn non_enum_error() -> syn::Error {
    syn::Error::new(Span::call_site(), "This macro only supports enums.")
}

pub fn non_unit_variant_error(span: Span) -> syn::Error {
    syn::Error::new(span, "Mnemonics can only be derived for unit variants.")
}
