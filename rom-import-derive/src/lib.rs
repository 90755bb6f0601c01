//! Derive macros for boilerplate trait implementation in the `rom-import-io`
//! and `rom-import-ops` crates.

#[macro_use]
extern crate quote;
#[macro_use]
extern crate syn;

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::DeriveInput;

/// Macro to implement `rom_import_io::identity::Identity` on a type, giving it
/// a construction-order integer handle independent of its field values. See
/// `rom_import_io::identity` for the trait definition -- two instances with
/// identical fields still get distinct ids, which is exactly what the
/// reference-identity module/song collections in `rom-import-ops` need.
#[proc_macro_derive(Identity)]
pub fn identity_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let counter_name = quote::format_ident!("__{}_IDENTITY_COUNTER", name.to_string().to_uppercase());

    let expanded = quote! {
        #[doc(hidden)]
        static #counter_name: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

        impl crate::identity::Identity for #name {
            fn next_id() -> crate::identity::Id<Self> {
                let raw = #counter_name.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                crate::identity::Id::from_raw(raw)
            }
        }
    };
    TokenStream::from(expanded)
}
