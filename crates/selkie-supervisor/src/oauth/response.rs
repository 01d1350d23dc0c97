//! Authorization response construction.
//!
//! Success and error responses travel back to the client either as a 303
//! redirect with query parameters or, when the request asked for
//! `response_mode=form_post`, as a 200 HTML page that auto-submits the
//! parameters with a POST. The form-post page carries a Content-Security-
//! Policy that allows exactly its own inline script and style, by hash.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::AuthorizeError;

/// Inline script of the form-post page. Submits the only form on load.
const FORM_POST_SCRIPT: &str =
    "window.addEventListener('load', function() { document.forms[0].submit(); });";

/// Inline style of the form-post page.
const FORM_POST_STYLE: &str = "body { font-family: sans-serif; margin: 2em; }";

/// Build the success redirect: `redirect_uri` plus `code` and `state`.
#[must_use]
pub fn success_redirect_url(
    redirect_uri: &Url,
    code: &str,
    state: Option<&str>,
) -> Url {
    let mut url = redirect_uri.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("code", code);
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }
    url
}

/// Build an error redirect: `redirect_uri` plus `error`,
/// `error_description`, and `state`.
#[must_use]
pub fn error_redirect_url(
    redirect_uri: &Url,
    error: &AuthorizeError,
    state: Option<&str>,
) -> Url {
    let mut url = redirect_uri.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("error", error.oauth_error_code());
        pairs.append_pair("error_description", error.description());
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }
    url
}

/// The response parameters for a form-post page.
#[must_use]
pub fn error_response_params(
    error: &AuthorizeError,
    state: Option<&str>,
) -> Vec<(String, String)> {
    let mut params = vec![
        ("error".to_string(), error.oauth_error_code().to_string()),
        (
            "error_description".to_string(),
            error.description().to_string(),
        ),
    ];
    if let Some(state) = state {
        params.push(("state".to_string(), state.to_string()));
    }
    params
}

/// Render the auto-submitting form-post page and the CSP header value that
/// permits exactly its inline script and style.
#[must_use]
pub fn form_post_page(redirect_uri: &Url, params: &[(String, String)]) -> (String, String) {
    let mut inputs = String::new();
    for (name, value) in params {
        inputs.push_str(&format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
            html_escape(name),
            html_escape(value)
        ));
    }

    let html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Logging in...</title>\n\
         <style>{FORM_POST_STYLE}</style>\n\
         </head>\n<body>\n\
         <noscript>JavaScript is required to complete the login.</noscript>\n\
         <form method=\"post\" action=\"{}\">\n{inputs}</form>\n\
         <script>{FORM_POST_SCRIPT}</script>\n\
         </body>\n</html>\n",
        html_escape(redirect_uri.as_str()),
    );

    (html, form_post_content_security_policy())
}

/// The CSP served with the form-post page: nothing is allowed except the
/// page's own inline script and style, identified by hash.
#[must_use]
pub fn form_post_content_security_policy() -> String {
    format!(
        "default-src 'none'; script-src '{}'; style-src '{}'; frame-ancestors 'none'",
        csp_sha256(FORM_POST_SCRIPT),
        csp_sha256(FORM_POST_STYLE)
    )
}

fn csp_sha256(source: &str) -> String {
    format!("sha256-{}", STANDARD.encode(Sha256::digest(source.as_bytes())))
}

fn html_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
