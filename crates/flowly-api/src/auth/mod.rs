// Authentication module
// Decision: Identity only; Flowly has no user accounts of its own, tokens come from
//           an external issuer sharing the HS256 secret

pub mod identity;
pub mod jwt;

pub use identity::{AuthError, AuthMethod, AuthState, Identity, OptionalIdentity, StreamIdentity};
pub use jwt::JwtVerifier;
