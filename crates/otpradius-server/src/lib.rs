//! RADIUS gateway that authenticates users with TOTP codes
//!
//! Built on `otpradius-proto`. A [`PacketServer`] receives Access-Requests
//! over UDP and passes them to a [`Handler`], which filters clients by
//! source network and asks an [`Authenticator`] for the decision. A
//! [`HealthServer`] answers liveness probes, and [`Server`] runs both
//! listeners and stops them together.
//!
//! # Example
//!
//! ```rust,no_run
//! use otpradius_server::{Handler, HealthServer, PacketServer, Server, Totp, TotpAuthenticator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let totp = Totp::from_base32("JBSWY3DPEHPK3PXP")?;
//!     let authenticator = TotpAuthenticator::new(totp).with_valid_users(["alice"]);
//!     let handler = Handler::new(Arc::new(authenticator))
//!         .with_allowed_client_sources(Some("10.0.0.0/24".parse()?));
//!
//!     let radius = PacketServer::bind("0.0.0.0:51812".parse()?, "testing123", Arc::new(handler)).await?;
//!     let health = HealthServer::bind("0.0.0.0:8080".parse()?).await?;
//!
//!     Server::new(Arc::new(radius), Arc::new(health))
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod authenticator;
pub mod config;
pub mod handler;
pub mod health;
pub mod server;
pub mod totp;
pub mod transport;

pub use authenticator::{
    AuthError, Authenticator, EapAuthenticator, Request, Response, ResponseReason,
    TotpAuthenticator,
};
pub use config::{Args, AuthenticatorKind, Config, ConfigError};
pub use handler::{Handler, HandlerError};
pub use health::{create_health_router, HealthServer};
pub use server::{Listener, Server, ServerError, DEFAULT_SHUTDOWN_GRACE};
pub use totp::{Totp, TotpError};
pub use transport::{
    IncomingRequest, PacketServer, RadiusHandler, ResponseWriter, TransportError,
    UdpResponseWriter,
};
