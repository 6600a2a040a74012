//! cyclebench Macros
//!
//! Procedural macros for profile regions.
//!
//! ## Macros
//!
//! - `#[profile]` - Profile the whole body of a function as one region

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Expr, ItemFn, parse_macro_input};

mod attr {
    use syn::meta::ParseNestedMeta;

    /// Get the attribute name as a string
    pub fn name(meta: &ParseNestedMeta) -> String {
        meta.path
            .get_ident()
            .map(|i| i.to_string())
            .unwrap_or_default()
    }

    /// Parse a string literal attribute: `attr = "value"`
    pub fn string(meta: &ParseNestedMeta) -> syn::Result<String> {
        let value: syn::LitStr = meta.value()?.parse()?;
        Ok(value.value())
    }

    /// Parse an arbitrary expression attribute: `attr = data.len()`
    pub fn expr(meta: &ParseNestedMeta) -> syn::Result<syn::Expr> {
        meta.value()?.parse()
    }

    /// Create an unknown attribute error
    pub fn unknown(meta: &ParseNestedMeta, name: &str) -> syn::Error {
        meta.error(format!("unknown attribute: {}", name))
    }
}

/// Profile a function body as one region of the thread's profiler
///
/// # Example
///
/// ```ignore
/// #[cyclebench::profile]
/// fn parse(input: &str) -> Ast { ... }
///
/// // Custom label, and bytes attributed for bandwidth
/// #[cyclebench::profile(name = "checksum", bytes = data.len())]
/// fn checksum(data: &[u8]) -> u64 { ... }
/// ```
///
/// The label defaults to the function name. `bytes` may refer to the
/// function's arguments and is evaluated once on entry.
#[proc_macro_attribute]
pub fn profile(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = TokenStream2::from(args);
    let func = parse_macro_input!(item as ItemFn);

    profile_impl(args, func)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

#[derive(Default)]
struct ProfileConfig {
    name: Option<String>,
    bytes: Option<Expr>,
}

fn parse_profile_config(args: TokenStream2) -> Result<ProfileConfig, syn::Error> {
    let mut config = ProfileConfig::default();
    if args.is_empty() {
        return Ok(config);
    }

    let parser = syn::meta::parser(|meta| {
        let name = attr::name(&meta);
        match name.as_str() {
            "name" => config.name = Some(attr::string(&meta)?),
            "bytes" => config.bytes = Some(attr::expr(&meta)?),
            _ => return Err(attr::unknown(&meta, &name)),
        }
        Ok(())
    });

    syn::parse::Parser::parse2(parser, args)?;
    Ok(config)
}

fn validate_signature(func: &ItemFn) -> syn::Result<()> {
    if func.sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(
            func.sig.asyncness,
            "cyclebench: #[profile] regions cannot span an await point",
        ));
    }
    if func.sig.constness.is_some() {
        return Err(syn::Error::new_spanned(
            func.sig.constness,
            "cyclebench: #[profile] cannot be used on a const fn",
        ));
    }
    Ok(())
}

fn profile_impl(args: TokenStream2, func: ItemFn) -> Result<TokenStream2, syn::Error> {
    validate_signature(&func)?;
    let config = parse_profile_config(args)?;

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = func;

    let label = config.name.unwrap_or_else(|| sig.ident.to_string());
    let region = match config.bytes {
        Some(bytes) => quote! { ::cyclebench::profile_bandwidth!(#label, #bytes); },
        None => quote! { ::cyclebench::profile_block!(#label); },
    };

    Ok(quote! {
        #(#attrs)*
        #vis #sig {
            #region
            #block
        }
    })
}
