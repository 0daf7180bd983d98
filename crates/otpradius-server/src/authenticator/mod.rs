//! Authentication decisions
//!
//! An [`Authenticator`] turns one [`Request`] into a [`Response`]. The
//! handler holds exactly one authenticator, chosen at startup.

mod eap;
mod totp;

pub use eap::EapAuthenticator;
pub use totp::TotpAuthenticator;

use crate::totp::TotpError;
use otpradius_proto::{Attribute, EapError};
use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing EAP message")]
    MissingEapMessage,
    #[error("decoding EAP message: {0}")]
    Eap(#[from] EapError),
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
    #[error("TOTP verification failed: {0}")]
    Totp(#[from] TotpError),
}

/// One authentication attempt
#[derive(Debug, Clone)]
pub struct Request {
    pub remote_addr: SocketAddr,
    /// When the request arrived; TOTP codes are checked against this
    pub timestamp: SystemTime,
    /// User-Name, empty when absent
    pub username: String,
    /// Recovered User-Password, empty when absent
    pub password: String,
    /// Every attribute of the Access-Request, in wire order
    pub attributes: Vec<Attribute>,
}

/// Why a request was approved or denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseReason {
    Valid,
    UnknownUser,
    InvalidPassword,
}

impl fmt::Display for ResponseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseReason::Valid => "valid request",
            ResponseReason::UnknownUser => "unknown user",
            ResponseReason::InvalidPassword => "invalid password",
        })
    }
}

/// Outcome of an authentication attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    approved: bool,
    reasons: Vec<ResponseReason>,
}

impl Response {
    pub fn approve() -> Self {
        Response {
            approved: true,
            reasons: vec![ResponseReason::Valid],
        }
    }

    pub fn deny(reasons: impl IntoIterator<Item = ResponseReason>) -> Self {
        Response {
            approved: false,
            reasons: reasons.into_iter().collect(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approved
    }

    pub fn reasons(&self) -> &[ResponseReason] {
        &self.reasons
    }
}

/// Decides whether a request is accepted.
///
/// Implementations are shared across request tasks and must not keep
/// per-request state.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, request: &Request) -> Result<Response, AuthError>;
}
