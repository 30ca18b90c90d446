//! Parsing logic for the `#[rpcmux::service]` macro.
//!
//! This module validates the annotated trait and extracts the service name
//! and, per method, the wire name plus the request and response types.

use proc_macro2::Span;
use std::collections::HashSet;
use syn::{
    Attribute, Error, Expr, ExprLit, FnArg, GenericArgument, Ident, ItemTrait, Lit, LitStr, Meta,
    MetaNameValue, Pat, PathArguments, Result, ReturnType, TraitItem, TraitItemFn, Type,
};

/// Parsed service definition.
#[derive(Debug)]
pub struct ServiceDef {
    /// Trait name
    pub ident: Ident,
    /// Name the service is registered and called under
    pub name: String,
    /// Service methods in declaration order
    pub methods: Vec<MethodDef>,
}

/// Parsed method definition.
#[derive(Debug)]
pub struct MethodDef {
    /// Rust method name
    pub ident: Ident,
    /// Wire name (UpperCamelCase of the method name unless overridden)
    pub name: String,
    /// Name of the request parameter
    pub request_ident: Ident,
    /// Request type
    pub request: Type,
    /// `T` of the `Reply<T>` parameter
    pub response: Type,
}

/// Parses the attribute arguments and the trait.
pub fn parse_service(trait_def: &ItemTrait, attr_args: &[Meta]) -> Result<ServiceDef> {
    let ident = trait_def.ident.clone();
    let mut name = None;

    for meta in attr_args {
        match meta {
            Meta::NameValue(MetaNameValue { path, value, .. }) if path.is_ident("name") => {
                name = Some(string_literal(value, "name")?);
            }
            _ => {
                return Err(Error::new_spanned(
                    meta,
                    "Unknown attribute. Supported: name = \"...\"",
                ));
            }
        }
    }
    let name = name.unwrap_or_else(|| ident.to_string());
    if name.is_empty() {
        return Err(Error::new(Span::call_site(), "Service name must not be empty"));
    }

    if !trait_def.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &trait_def.generics,
            "Service traits cannot be generic",
        ));
    }

    let mut methods = Vec::new();
    let mut seen = HashSet::new();
    for item in &trait_def.items {
        if let TraitItem::Fn(method) = item {
            let method = parse_method(method)?;
            if !seen.insert(method.name.clone()) {
                return Err(Error::new_spanned(
                    &method.ident,
                    format!("Duplicate method name '{}'", method.name),
                ));
            }
            methods.push(method);
        }
    }

    if methods.is_empty() {
        return Err(Error::new_spanned(
            trait_def,
            "Service trait must have at least one method",
        ));
    }

    Ok(ServiceDef {
        ident,
        name,
        methods,
    })
}

/// Parses one trait method of the form
/// `fn name(&self, request: Req, reply: Reply<Resp>);`.
fn parse_method(method: &TraitItemFn) -> Result<MethodDef> {
    let sig = &method.sig;
    if sig.asyncness.is_some() {
        return Err(Error::new_spanned(
            sig.asyncness,
            "Service methods cannot be async; complete the Reply instead",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(Error::new_spanned(&sig.generics, "Service methods cannot be generic"));
    }
    if let ReturnType::Type(_, ty) = &sig.output {
        return Err(Error::new_spanned(
            ty,
            "Service methods return nothing; the response goes through the Reply",
        ));
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(Error::new_spanned(
                sig,
                "Service methods must take `&self` as their first parameter",
            ));
        }
    }

    let typed: Vec<_> = inputs
        .map(|arg| match arg {
            FnArg::Typed(pat_type) => Ok(pat_type),
            FnArg::Receiver(receiver) => Err(Error::new_spanned(receiver, "Unexpected receiver")),
        })
        .collect::<Result<_>>()?;
    let [request, reply] = typed.as_slice() else {
        return Err(Error::new_spanned(
            &sig.inputs,
            "Service methods take exactly two parameters: a request and a `Reply<T>`",
        ));
    };

    let Pat::Ident(request_pat) = &*request.pat else {
        return Err(Error::new_spanned(
            &request.pat,
            "Only simple parameter names are supported",
        ));
    };
    let response = reply_type(&reply.ty)?;

    let mut name = None;
    for attr in &method.attrs {
        if attr.path().is_ident("rpc") {
            name = Some(parse_rpc_attribute(attr)?);
        }
    }
    let name = name.unwrap_or_else(|| upper_camel(&sig.ident.to_string()));

    Ok(MethodDef {
        ident: sig.ident.clone(),
        name,
        request_ident: request_pat.ident.clone(),
        request: (*request.ty).clone(),
        response,
    })
}

/// Extracts `T` from a `Reply<T>` (or `path::to::Reply<T>`) type.
fn reply_type(ty: &Type) -> Result<Type> {
    let error = || Error::new_spanned(ty, "The second parameter must be a `Reply<T>`");
    let Type::Path(type_path) = ty else {
        return Err(error());
    };
    let segment = type_path.path.segments.last().ok_or_else(error)?;
    if segment.ident != "Reply" {
        return Err(error());
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return Err(error());
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Ok(inner.clone()),
        _ => Err(error()),
    }
}

/// Parses `#[rpc(name = "...")]`.
fn parse_rpc_attribute(attr: &Attribute) -> Result<String> {
    let nested: MetaNameValue = attr.parse_args()?;
    if !nested.path.is_ident("name") {
        return Err(Error::new_spanned(
            &nested.path,
            "Expected 'name' in #[rpc(name = \"...\")]",
        ));
    }
    let name = string_literal(&nested.value, "name")?;
    if name.is_empty() {
        return Err(Error::new_spanned(&nested.value, "Method name must not be empty"));
    }
    Ok(name)
}

fn string_literal(value: &Expr, attribute: &str) -> Result<String> {
    match value {
        Expr::Lit(ExprLit {
            lit: Lit::Str(lit), ..
        }) => Ok(LitStr::value(lit)),
        other => Err(Error::new_spanned(
            other,
            format!("{attribute} must be a string literal"),
        )),
    }
}

/// Converts `snake_case` to `UpperCamelCase`.
pub fn upper_camel(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Converts `UpperCamelCase` to `snake_case`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
