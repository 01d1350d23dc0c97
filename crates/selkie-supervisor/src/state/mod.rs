//! Authenticated state carried through browser redirects.
//!
//! The browser flow stores no server-side session before the user reaches
//! the upstream identity provider. Everything the callback needs rides in
//! two client-held values instead:
//!
//! - the upstream `state` parameter, an authenticated encoding of the
//!   original request plus the per-login CSRF/nonce/PKCE values, and
//! - the `__Host-pinniped-csrf` double-submit cookie, bound to the state
//!   parameter to defeat cross-site flow initiation.
//!
//! Both are produced by the same symmetric codec under different codec
//! names, so a value minted for one purpose never verifies as the other.

mod codec;
mod upstream;

pub use codec::{CodecError, CodecKeys, StateCodec};
pub use upstream::{
    CSRF_COOKIE_ENCODING_NAME, CSRF_COOKIE_NAME, CsrfToken, Nonce,
    UPSTREAM_STATE_PARAM_ENCODING_NAME, UPSTREAM_STATE_PARAM_FORMAT_VERSION,
    UpstreamStateParamData,
};
