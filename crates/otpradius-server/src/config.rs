use crate::totp::Totp;
use clap::{Parser, ValueEnum};
use ipnetwork::IpNetwork;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is empty", .0.display())]
    EmptySecret(PathBuf),
    #[error("invalid TOTP secret in {}: {reason}", path.display())]
    InvalidSecret { path: PathBuf, reason: String },
    #[error("invalid allowed client sources {0:?}: expected an IP address or CIDR network")]
    InvalidNetwork(String),
}

/// Which authenticator answers requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthenticatorKind {
    /// Password must be the current TOTP code
    Totp,
    /// EAP front end; never approves
    Eap,
}

/// RADIUS gateway that checks passwords as TOTP codes
#[derive(Parser, Debug, Clone)]
#[command(name = "otpradius", author, version, about, long_about = None)]
pub struct Args {
    /// UDP address for RADIUS requests
    #[arg(long, env = "OTPRADIUS_BIND_ADDR", default_value = "0.0.0.0:51812")]
    pub bind_addr: SocketAddr,

    /// TCP address for the /healthz endpoint
    #[arg(long, env = "OTPRADIUS_HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    pub health_addr: SocketAddr,

    /// File holding the RADIUS shared secret
    #[arg(
        long,
        env = "OTPRADIUS_CLIENT_SECRET_PATH",
        default_value = "./config/client-secret"
    )]
    pub client_secret_path: PathBuf,

    /// File holding the base32 TOTP secret
    #[arg(
        long,
        env = "OTPRADIUS_TOTP_SECRET_PATH",
        default_value = "./config/totp-secret"
    )]
    pub totp_secret_path: PathBuf,

    /// IP address or CIDR network clients must come from (default: any)
    #[arg(long, env = "OTPRADIUS_ALLOWED_CLIENT_SOURCES")]
    pub allowed_client_sources: Option<String>,

    /// Comma separated usernames allowed to authenticate (default: any)
    #[arg(long, env = "OTPRADIUS_VALID_USERS", value_delimiter = ',')]
    pub valid_users: Vec<String>,

    #[arg(long, env = "OTPRADIUS_AUTHENTICATOR", value_enum, default_value_t = AuthenticatorKind::Totp)]
    pub authenticator: AuthenticatorKind,

    /// Seconds each listener gets to stop on shutdown
    #[arg(long, env = "OTPRADIUS_SHUTDOWN_GRACE_SECS", default_value_t = 10)]
    pub shutdown_grace_secs: u64,

    /// Log filter when RUST_LOG is unset: trace, debug, info, warn, error
    #[arg(long, env = "OTPRADIUS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Load the configuration, report problems and exit
    #[arg(long)]
    pub validate: bool,
}

/// Everything the gateway needs, loaded and checked before serving
#[derive(Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub health_addr: SocketAddr,
    pub client_secret: Vec<u8>,
    pub totp: Totp,
    pub allowed_client_sources: Option<IpNetwork>,
    pub valid_users: Vec<String>,
    pub authenticator: AuthenticatorKind,
    pub shutdown_grace: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("health_addr", &self.health_addr)
            .field("client_secret", &"<redacted>")
            .field("totp", &self.totp)
            .field("allowed_client_sources", &self.allowed_client_sources)
            .field("valid_users", &self.valid_users)
            .field("authenticator", &self.authenticator)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let allowed_client_sources = args
            .allowed_client_sources
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_network)
            .transpose()?;

        let valid_users = args
            .valid_users
            .iter()
            .map(|user| user.trim())
            .filter(|user| !user.is_empty())
            .map(String::from)
            .collect();

        Ok(Config {
            bind_addr: args.bind_addr,
            health_addr: args.health_addr,
            client_secret: read_secret(&args.client_secret_path)?.into_bytes(),
            totp: read_totp(&args.totp_secret_path)?,
            allowed_client_sources,
            valid_users,
            authenticator: args.authenticator,
            shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
        })
    }
}

/// Read a secret file, ignoring surrounding whitespace
pub fn read_secret(path: &Path) -> Result<String, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let secret = contents.trim();
    if secret.is_empty() {
        return Err(ConfigError::EmptySecret(path.to_path_buf()));
    }
    Ok(secret.to_string())
}

fn read_totp(path: &Path) -> Result<Totp, ConfigError> {
    Totp::from_base32(&read_secret(path)?).map_err(|e| ConfigError::InvalidSecret {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Parse a CIDR network, or a single address as a /32 or /128
pub fn parse_network(value: &str) -> Result<IpNetwork, ConfigError> {
    if let Ok(network) = value.parse::<IpNetwork>() {
        return Ok(network);
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Ok(IpNetwork::from(ip));
    }

    Err(ConfigError::InvalidNetwork(value.to_string()))
}
