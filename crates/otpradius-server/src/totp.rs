//! Time-based one-time passwords (RFC 6238)
//!
//! HMAC-SHA1 codes with a 30 second step and 6 digits, verified with a
//! tolerance of one step either side of the request time.

use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Length of one time step
pub const TOTP_STEP: Duration = Duration::from_secs(30);
/// Digits in a code
pub const TOTP_DIGITS: u32 = 6;
/// Steps accepted on each side of the current one
pub const TOTP_SKEW: u64 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TotpError {
    #[error("invalid TOTP secret: {0}")]
    InvalidSecret(String),
    #[error("timestamp is before the Unix epoch")]
    ClockBeforeEpoch,
}

/// Shared-secret TOTP generator and verifier
#[derive(Clone)]
pub struct Totp {
    secret: Vec<u8>,
    step: u64,
    digits: u32,
    skew: u64,
}

impl fmt::Debug for Totp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Totp")
            .field("secret", &"<redacted>")
            .field("step", &self.step)
            .field("digits", &self.digits)
            .field("skew", &self.skew)
            .finish()
    }
}

impl Totp {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, TotpError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TotpError::InvalidSecret("secret is empty".to_string()));
        }

        Ok(Totp {
            secret,
            step: TOTP_STEP.as_secs(),
            digits: TOTP_DIGITS,
            skew: TOTP_SKEW,
        })
    }

    /// Build from the base32 text authenticator apps are provisioned with
    pub fn from_base32(encoded: &str) -> Result<Self, TotpError> {
        Self::new(decode_base32(encoded)?)
    }

    pub fn with_skew(mut self, skew: u64) -> Self {
        self.skew = skew;
        self
    }

    /// Code for time step `counter` (HOTP, RFC 4226 Section 5.3)
    pub fn code_for_step(&self, counter: u64) -> Result<String, TotpError> {
        let mut mac = HmacSha1::new_from_slice(&self.secret)
            .map_err(|e| TotpError::InvalidSecret(e.to_string()))?;
        mac.update(&counter.to_be_bytes());
        let hash = mac.finalize().into_bytes();

        let offset = (hash[hash.len() - 1] & 0x0f) as usize;
        let binary = u32::from_be_bytes([
            hash[offset] & 0x7f,
            hash[offset + 1],
            hash[offset + 2],
            hash[offset + 3],
        ]);
        let code = binary % 10u32.pow(self.digits);

        Ok(format!("{:0width$}", code, width = self.digits as usize))
    }

    /// Time step containing `time`
    pub fn step_at(&self, time: SystemTime) -> Result<u64, TotpError> {
        let elapsed = time
            .duration_since(UNIX_EPOCH)
            .map_err(|_| TotpError::ClockBeforeEpoch)?;
        Ok(elapsed.as_secs() / self.step)
    }

    /// Code valid at `time`
    pub fn at(&self, time: SystemTime) -> Result<String, TotpError> {
        self.code_for_step(self.step_at(time)?)
    }

    /// Check `code` against every step within the skew window around `time`
    pub fn verify(&self, code: &str, time: SystemTime) -> Result<bool, TotpError> {
        if code.len() != self.digits as usize {
            return Ok(false);
        }

        let current = self.step_at(time)?;
        let first = current.saturating_sub(self.skew);
        let last = current.saturating_add(self.skew);

        let mut matched = false;
        for counter in first..=last {
            let expected = self.code_for_step(counter)?;
            matched |= constant_time_eq(expected.as_bytes(), code.as_bytes());
        }
        Ok(matched)
    }
}

/// RFC 4648 base32, case-insensitive, ignoring padding and whitespace
fn decode_base32(encoded: &str) -> Result<Vec<u8>, TotpError> {
    let mut output = Vec::with_capacity(encoded.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for c in encoded.chars() {
        if c == '=' || c.is_whitespace() {
            continue;
        }
        let value = match c.to_ascii_uppercase() {
            c @ 'A'..='Z' => c as u32 - 'A' as u32,
            c @ '2'..='7' => c as u32 - '2' as u32 + 26,
            other => {
                return Err(TotpError::InvalidSecret(format!(
                    "'{}' is not a base32 character",
                    other
                )))
            }
        };

        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            output.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Ok(output)
}
