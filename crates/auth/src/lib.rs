//! `stockflow-auth`: the credential gate.
//!
//! Token verification, role checks, password hashing and the user model.
//! Decoupled from HTTP and storage: callers hand in the bearer string and a
//! clock, and get back an [`Identity`] or a typed [`AuthError`].

pub mod claims;
pub mod gate;
pub mod password;
pub mod roles;
pub mod token;
pub mod user;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use gate::{AuthError, Identity, authenticate, authorize};
pub use password::{PasswordError, hash_password, verify_password};
pub use roles::Role;
pub use token::{Hs256JwtValidator, IssuedToken, JwtValidator, TokenError, TokenIssuer};
pub use user::{NewUser, User, UserPatch, authorize_user_patch, can_view_user};
