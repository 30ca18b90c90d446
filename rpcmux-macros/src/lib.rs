//! Procedural macros for rpcmux.
//!
//! This crate provides the `#[rpcmux::service]` attribute macro, which turns a
//! trait describing a service into a descriptor function for the server side
//! and a typed client stub.
//!
//! # Example
//!
//! ```ignore
//! use rpcmux::{Reply, service};
//!
//! #[service(name = "Echo")]
//! pub trait Echo {
//!     fn say(&self, text: String, reply: Reply<String>);
//! }
//! ```
//!
//! This will generate:
//! - `echo_descriptor::<S, Z>()`, building a `ServiceDescriptor<S, Z>` for any
//!   `S: Echo`, with one method named `Say` at index 0
//! - An `EchoClient` struct with `async fn say(&self, text: &String)`

use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemTrait, Meta, Token, TraitItem, parse_macro_input, punctuated::Punctuated};

mod generate;
mod parse;

/// The `#[rpcmux::service]` attribute macro.
///
/// # Attributes
///
/// - `name = "..."`: name the service is registered and called under.
///   Defaults to the trait name.
///
/// Individual methods may carry `#[rpc(name = "...")]` to override their wire
/// name, which otherwise is the method name in UpperCamelCase.
///
/// # Method Signatures
///
/// Every method must have the form:
///
/// ```ignore
/// fn method(&self, request: Request, reply: Reply<Response>);
/// ```
///
/// The method answers by completing `reply`, either before returning or later
/// from another thread. Method indices follow declaration order.
#[proc_macro_attribute]
pub fn service(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(item as ItemTrait);

    let attr_args = if attr.is_empty() {
        Vec::new()
    } else {
        match syn::parse::Parser::parse(Punctuated::<Meta, Token![,]>::parse_terminated, attr) {
            Ok(args) => args.into_iter().collect(),
            Err(err) => return err.to_compile_error().into(),
        }
    };

    let service = match parse::parse_service(&input, &attr_args) {
        Ok(service) => service,
        Err(err) => return err.to_compile_error().into(),
    };

    // `#[rpc]` is only meaningful to this macro.
    for item in &mut input.items {
        if let TraitItem::Fn(method) = item {
            method.attrs.retain(|attr| !attr.path().is_ident("rpc"));
        }
    }

    let descriptor = generate::generate_descriptor(&service, &input.vis);
    let client_stub = generate::generate_client_stub(&service, &input.vis);

    let expanded = quote! {
        #input

        #descriptor

        #client_stub
    };

    TokenStream::from(expanded)
}
