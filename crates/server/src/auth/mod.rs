mod jwt;
mod middleware;
pub mod password;

pub use jwt::{AccessToken, AccessTokenClaims, JwtError, JwtService, TOKEN_AUDIENCE};
pub use middleware::{
    RequestContext, TOKEN_COOKIE, authenticate, require_auth, token_from_headers,
};
