//! Code generation for the `#[rpcmux::service]` macro.
//!
//! This module generates:
//! - A descriptor function that builds the `ServiceDescriptor` for any type
//!   implementing the trait
//! - A client stub with one async method per service method

use crate::parse::{ServiceDef, snake_case};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::Visibility;

/// Generates `fn <service>_descriptor<S, Z>()`.
pub fn generate_descriptor(service: &ServiceDef, vis: &Visibility) -> TokenStream {
    let trait_ident = &service.ident;
    let service_name = &service.name;
    let fn_ident = format_ident!("{}_descriptor", snake_case(&trait_ident.to_string()));
    let doc = format!(
        "Builds the descriptor of the `{service_name}` service for any type implementing [`{trait_ident}`]."
    );

    let methods = service.methods.iter().map(|method| {
        let ident = &method.ident;
        let name = &method.name;
        let request = &method.request;
        let response = &method.response;
        quote! {
            .method::<#request, #response, _>(
                #name,
                |service: &S, request: #request, reply: ::rpcmux::Reply<#response>| {
                    <S as #trait_ident>::#ident(service, request, reply)
                },
            )
        }
    });

    quote! {
        #[doc = #doc]
        ///
        /// # Errors
        ///
        /// Fails only if two methods share a wire name.
        #vis fn #fn_ident<S, Z>() -> ::core::result::Result<
            ::rpcmux::ServiceDescriptor<S, Z>,
            ::rpcmux::ServerError,
        >
        where
            S: #trait_ident + ::core::marker::Send + ::core::marker::Sync + 'static,
            Z: ::rpcmux::serialization::Serializer,
        {
            ::rpcmux::ServiceDescriptor::<S, Z>::builder(#service_name)
                #(#methods)*
                .build()
        }
    }
}

/// Generates the `<Trait>Client` stub.
pub fn generate_client_stub(service: &ServiceDef, vis: &Visibility) -> TokenStream {
    let trait_ident = &service.ident;
    let service_name = &service.name;
    let client_ident = format_ident!("{}Client", trait_ident);
    let doc = format!("Client stub for the `{service_name}` service.");

    let methods = service.methods.iter().map(|method| {
        let ident = &method.ident;
        let name = &method.name;
        let request_ident = &method.request_ident;
        let request = &method.request;
        let response = &method.response;
        let doc = format!("Calls `{service_name}.{name}`.");
        quote! {
            #[doc = #doc]
            pub async fn #ident(
                &self,
                #request_ident: &#request,
            ) -> ::core::result::Result<#response, ::rpcmux::RpcError> {
                self.client
                    .invoke::<#request, #response, Z>(
                        &self.connection,
                        #service_name,
                        #name,
                        #request_ident,
                        &self.serializer,
                        self.deadline,
                    )
                    .await
            }
        }
    });

    quote! {
        #[doc = #doc]
        #[derive(Debug, Clone)]
        #vis struct #client_ident<Z = ::rpcmux::serialization::PostcardSerializer> {
            client: ::rpcmux::RpcClient,
            connection: ::rpcmux::Connection,
            serializer: Z,
            deadline: ::core::option::Option<::std::time::Duration>,
        }

        impl<Z: ::rpcmux::serialization::Serializer> #client_ident<Z> {
            /// Name of the service this stub calls.
            pub const SERVICE_NAME: &'static str = #service_name;

            /// Creates a stub calling over `connection`.
            pub fn new(client: ::rpcmux::RpcClient, connection: ::rpcmux::Connection, serializer: Z) -> Self {
                Self {
                    client,
                    connection,
                    serializer,
                    deadline: ::core::option::Option::None,
                }
            }

            /// Applies `deadline` to every call made through this stub.
            pub fn with_deadline(mut self, deadline: ::std::time::Duration) -> Self {
                self.deadline = ::core::option::Option::Some(deadline);
                self
            }

            #(#methods)*
        }
    }
}
