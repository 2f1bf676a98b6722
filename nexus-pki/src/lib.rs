//! Nexus PKI - CA, Certificate Issuance and Token Families
//!
//! One RSA-4096 root keypair anchors everything this crate does: it signs
//! the self-managed CA certificate, every issued leaf certificate, and all
//! three RS256 JWT families. The JWKS published for token verification is
//! therefore the same trust material as the CA certificate itself.
//!
//! Key rotation is out of scope: a single active CA is assumed, and
//! rotating it would force re-issuance of all outstanding endorsements.

mod ca;
mod error;
mod issuer;
mod tokens;

pub use ca::*;
pub use error::*;
pub use issuer::*;
pub use tokens::*;
