use super::{AuthError, Authenticator, Request, Response, ResponseReason};
use crate::totp::Totp;
use std::collections::HashSet;

/// Accepts a request whose password is the current TOTP code.
///
/// When a valid-user set is configured the username must be a member of
/// it; an empty set accepts any username.
#[derive(Debug, Clone)]
pub struct TotpAuthenticator {
    totp: Totp,
    valid_users: HashSet<String>,
}

impl TotpAuthenticator {
    pub fn new(totp: Totp) -> Self {
        TotpAuthenticator {
            totp,
            valid_users: HashSet::new(),
        }
    }

    pub fn with_valid_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_users = users.into_iter().map(Into::into).collect();
        self
    }

    fn is_known_user(&self, username: &str) -> bool {
        self.valid_users.is_empty() || self.valid_users.contains(username)
    }
}

impl Authenticator for TotpAuthenticator {
    fn authenticate(&self, request: &Request) -> Result<Response, AuthError> {
        if !self.is_known_user(&request.username) {
            return Ok(Response::deny([ResponseReason::UnknownUser]));
        }
        if !self.totp.verify(&request.password, request.timestamp)? {
            return Ok(Response::deny([ResponseReason::InvalidPassword]));
        }

        Ok(Response::approve())
    }
}
