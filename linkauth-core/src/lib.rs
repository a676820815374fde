//! linkauth core library
//!
//! I/O-free building blocks shared by the identity broker:
//! - Ed25519 key pairs used to sign every token the broker issues
//! - The dual-token wire format: a long-lived SessionToken that can only be
//!   exchanged for a refresh, and a short-lived AuthToken that carries the
//!   caller's identity and a role-flag snapshot

pub mod error;
pub mod keys;
pub mod token;

pub use error::Error;
pub use keys::{KeyPair, PublicKey};
pub use token::{AuthClaims, RoleFlags, SessionClaims, TokenSigner, DEFAULT_ISSUER};

/// Result type for linkauth-core operations
pub type Result<T> = std::result::Result<T, Error>;
