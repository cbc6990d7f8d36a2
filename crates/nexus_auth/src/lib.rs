//! Identity checking: SRP6 credential verification over the 2048-bit group,
//! and the client-visible deny codes.
//!
//! The login exchange is one round trip: the client sends its public key `A`
//! and proof `M1` together, so the server ephemeral is derived
//! deterministically from the stored salt and verifier instead of being
//! negotiated first. Both sides can compute it, and the proofs still bind the
//! session key to the password.

pub mod srp;

use thiserror::Error;

/// Client-visible refusal codes. The numeric values ride the wire and are
/// fixed for client compatibility.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum DenyCode {
    AccountNotFound = 16,
    BuildMismatch = 19,
    BadCredentials = 21,
    AccountSuspended = 23,
    TokenExpired = 24,
    TokenReused = 25,
}

impl DenyCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum AuthError {
    #[error("account not found")]
    AccountNotFound,
    #[error("client build does not match")]
    BuildMismatch,
    #[error("bad credentials")]
    BadCredentials,
    #[error("account suspended")]
    AccountSuspended,
    #[error("session token expired")]
    TokenExpired,
    #[error("session token already redeemed")]
    TokenReused,
}

impl AuthError {
    pub fn deny_code(self) -> DenyCode {
        match self {
            AuthError::AccountNotFound => DenyCode::AccountNotFound,
            AuthError::BuildMismatch => DenyCode::BuildMismatch,
            AuthError::BadCredentials => DenyCode::BadCredentials,
            AuthError::AccountSuspended => DenyCode::AccountSuspended,
            AuthError::TokenExpired => DenyCode::TokenExpired,
            AuthError::TokenReused => DenyCode::TokenReused,
        }
    }
}

/// Successful verification: the server proof to return and the session key
/// shared with the realm and world servers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AuthSuccess {
    pub m2: [u8; 32],
    pub session_key: [u8; 16],
}

/// Credential verification port. The default implementation is
/// [`Srp6Identity`]; alternatives exist so tests can stub the math out.
pub trait IdentityCheck: Send + Sync + 'static {
    fn verify_credentials(
        &self,
        email: &str,
        salt: &[u8],
        verifier: &[u8],
        a_pub: &[u8],
        m1: &[u8; 32],
    ) -> Result<AuthSuccess, AuthError>;
}

/// The SRP6 implementation of [`IdentityCheck`].
#[derive(Default, Clone, Copy, Debug)]
pub struct Srp6Identity;

impl IdentityCheck for Srp6Identity {
    fn verify_credentials(
        &self,
        _email: &str,
        salt: &[u8],
        verifier: &[u8],
        a_pub: &[u8],
        m1: &[u8; 32],
    ) -> Result<AuthSuccess, AuthError> {
        srp::verify(salt, verifier, a_pub, m1)
    }
}
