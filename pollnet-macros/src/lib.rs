//! Attribute macros for `pollnet`.
//!
//! - `#[pollnet::main]` turns an `async fn main` into a synchronous one
//!   that runs its body on a fresh runtime.
//! - `#[pollnet::test]` does the same for `async` test functions and adds
//!   `#[test]`.
//!
//! Both accept an optional `worker_threads = N` argument.

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item)
}

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let test_attr: TokenStream = "#[test]".parse().unwrap();

    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(expand(attr, item));

    result.into_iter().collect()
}

/// Removes `async` from the function signature and wraps its body in
/// `RuntimeBuilder::new()...build().block_on(async move { .. })`.
fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let builder = match runtime_builder(&attr.to_string()) {
        Ok(builder) => builder,
        Err(msg) => return compile_error(&msg),
    };

    if let Some(pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        tokens.remove(pos);
    }

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return compile_error("expected a function body");
    };

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let new_block = format!(
        "{{
            let runtime = {builder};
            runtime.block_on(async move {{ {block} }})
        }}"
    );

    let body = match new_block.parse() {
        Ok(body) => body,
        Err(err) => return compile_error(&format!("pollnet macro error: {err}")),
    };

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, body));

    tokens.into_iter().collect()
}

/// Builds the runtime construction expression from the attribute
/// arguments.
fn runtime_builder(attr: &str) -> Result<String, String> {
    let mut builder = String::from("::pollnet::RuntimeBuilder::new()");

    for part in attr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some(value) = part.strip_prefix("worker_threads") else {
            return Err(format!("unknown argument `{part}`"));
        };

        let value = value.trim().trim_start_matches('=').trim();

        match value.parse::<usize>() {
            Ok(n) if n > 0 => builder.push_str(&format!(".worker_threads({n})")),
            _ => return Err(format!("invalid worker_threads value `{value}`")),
        }
    }

    builder.push_str(".build()");

    Ok(builder)
}

fn compile_error(msg: &str) -> TokenStream {
    format!("compile_error!({msg:?});").parse().unwrap()
}
