use crate::authenticator::{Authenticator, Request};
use crate::transport::{IncomingRequest, RadiusHandler, ResponseWriter};
use async_trait::async_trait;
use ipnetwork::IpNetwork;
use otpradius_proto::{Attribute, AttributeType, Code, PacketError};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("remote address {remote} is not in the address family of {network}")]
    AddressFamily { remote: IpAddr, network: IpNetwork },
    #[error("reading User-Password: {0}")]
    Password(#[from] PacketError),
}

/// Answers each Access-Request with exactly one Access-Accept or
/// Access-Reject.
///
/// The source address is checked first; the authenticator only sees
/// requests from allowed clients. Any error along the way ends in a reject.
pub struct Handler {
    authenticator: Arc<dyn Authenticator>,
    allowed_client_sources: Option<IpNetwork>,
}

impl Handler {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Handler {
            authenticator,
            allowed_client_sources: None,
        }
    }

    /// Restrict clients to `network`; `None` allows every source
    pub fn with_allowed_client_sources(mut self, network: Option<IpNetwork>) -> Self {
        self.allowed_client_sources = network;
        self
    }

    pub fn is_source_valid(&self, remote_addr: SocketAddr) -> Result<bool, HandlerError> {
        let Some(network) = self.allowed_client_sources else {
            return Ok(true);
        };

        // IPv4-mapped IPv6 peers (dual-stack sockets) match IPv4 networks
        let remote = remote_addr.ip().to_canonical();
        match (network, remote) {
            (IpNetwork::V4(_), IpAddr::V4(_)) | (IpNetwork::V6(_), IpAddr::V6(_)) => {
                Ok(network.contains(remote))
            }
            _ => Err(HandlerError::AddressFamily { remote, network }),
        }
    }

    fn authentication_request(&self, request: &IncomingRequest) -> Result<Request, HandlerError> {
        Ok(Request {
            remote_addr: request.remote_addr,
            timestamp: SystemTime::now(),
            username: request.username(),
            password: request.password()?,
            attributes: request.packet.attributes.clone(),
        })
    }

    /// Reply code plus the attributes to send with it
    fn decide(&self, request: &IncomingRequest) -> (Code, Vec<Attribute>) {
        let reject = (Code::AccessReject, Vec::new());
        let remote_address = request.remote_addr;

        match self.is_source_valid(remote_address) {
            Ok(true) => {}
            Ok(false) => {
                warn!(%remote_address, "Rejecting request from disallowed source");
                return reject;
            }
            Err(e) => {
                error!(%remote_address, error = %e, "Validating source address");
                return reject;
            }
        }

        let auth_request = match self.authentication_request(request) {
            Ok(auth_request) => auth_request,
            Err(e) => {
                error!(%remote_address, error = %e, "Reading request");
                return reject;
            }
        };

        match self.authenticator.authenticate(&auth_request) {
            Ok(response) if response.is_approved() => {
                info!(%remote_address, username = %auth_request.username, "Request accepted");
                (Code::AccessAccept, Vec::new())
            }
            Ok(response) => {
                let reasons: Vec<String> =
                    response.reasons().iter().map(ToString::to_string).collect();
                warn!(
                    %remote_address,
                    username = %auth_request.username,
                    reasons = ?reasons,
                    "Request denied"
                );
                let reply_message = reasons
                    .first()
                    .and_then(|reason| Attribute::string(AttributeType::ReplyMessage, reason.as_str()).ok());
                (Code::AccessReject, reply_message.into_iter().collect())
            }
            Err(e) => {
                error!(
                    %remote_address,
                    username = %auth_request.username,
                    error = %e,
                    "Authenticating request"
                );
                reject
            }
        }
    }
}

#[async_trait]
impl RadiusHandler for Handler {
    async fn serve_radius(&self, writer: &mut dyn ResponseWriter, request: &IncomingRequest) {
        let remote_address = request.remote_addr;
        info!(%remote_address, request_id = request.packet.identifier, "Processing request");

        let (code, attributes) = self.decide(request);
        // A full-size request leaves no room for a Reply-Message next to the
        // echoed Proxy-State, so fall back to a bare reject.
        let response = match request.response(code, attributes) {
            Ok(response) => response,
            Err(e) => {
                warn!(%remote_address, error = %e, "Building response, sending bare reject");
                match request.response(Code::AccessReject, Vec::new()) {
                    Ok(response) => response,
                    Err(e) => {
                        error!(%remote_address, error = %e, "Building response");
                        return;
                    }
                }
            }
        };

        if let Err(e) = writer.write(response).await {
            error!(%remote_address, error = %e, "Writing response");
        }
    }
}
