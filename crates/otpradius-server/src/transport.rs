//! RADIUS over UDP
//!
//! [`PacketServer`] receives datagrams, decodes Access-Requests and hands
//! each one to a [`RadiusHandler`] on its own task, together with a
//! [`ResponseWriter`] that sends the signed reply back to the client.

use async_trait::async_trait;
use otpradius_proto::{decrypt_user_password, Attribute, AttributeType, Code, Packet, PacketError};
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("A response was already written for this request")]
    AlreadyWritten,
}

/// A decoded Access-Request together with the secret it was sent under
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub remote_addr: SocketAddr,
    pub packet: Packet,
    secret: Arc<[u8]>,
}

impl IncomingRequest {
    pub fn new(remote_addr: SocketAddr, packet: Packet, secret: Arc<[u8]>) -> Self {
        IncomingRequest {
            remote_addr,
            packet,
            secret,
        }
    }

    /// User-Name, empty when absent
    pub fn username(&self) -> String {
        self.packet
            .find_attribute(AttributeType::UserName)
            .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
            .unwrap_or_default()
    }

    /// Recovered User-Password, empty when absent
    pub fn password(&self) -> Result<String, PacketError> {
        match self.packet.find_attribute(AttributeType::UserPassword) {
            Some(attr) => decrypt_user_password(&attr.value, &self.secret, &self.packet.authenticator),
            None => Ok(String::new()),
        }
    }

    /// Build the signed reply for this request
    pub fn response(&self, code: Code, attributes: Vec<Attribute>) -> Result<Packet, PacketError> {
        self.packet.response(code, attributes, &self.secret)
    }
}

/// Sends the reply to one request
#[async_trait]
pub trait ResponseWriter: Send {
    async fn write(&mut self, response: Packet) -> Result<(), TransportError>;
}

/// Callback invoked once per Access-Request.
///
/// The handler is expected to write exactly one reply through `writer`.
#[async_trait]
pub trait RadiusHandler: Send + Sync + 'static {
    async fn serve_radius(&self, writer: &mut dyn ResponseWriter, request: &IncomingRequest);
}

/// Writes a reply datagram back to the requesting client, at most once
pub struct UdpResponseWriter {
    socket: Arc<UdpSocket>,
    remote_addr: SocketAddr,
    written: bool,
}

impl UdpResponseWriter {
    pub fn new(socket: Arc<UdpSocket>, remote_addr: SocketAddr) -> Self {
        UdpResponseWriter {
            socket,
            remote_addr,
            written: false,
        }
    }
}

#[async_trait]
impl ResponseWriter for UdpResponseWriter {
    async fn write(&mut self, response: Packet) -> Result<(), TransportError> {
        if self.written {
            return Err(TransportError::AlreadyWritten);
        }
        self.written = true;

        let bytes = response.encode()?;
        self.socket.send_to(&bytes, self.remote_addr).await?;

        debug!(
            response_type = ?response.code,
            client_addr = %self.remote_addr,
            request_id = response.identifier,
            "Sent RADIUS response"
        );
        Ok(())
    }
}

/// Counts request tasks that have not finished yet.
///
/// Once closed, no new task may enter.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    closed: AtomicBool,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl InFlight {
    fn enter(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(self));
        // Checked after counting so a concurrent wait_idle sees either the
        // count or the refusal
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(guard)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

async fn stopped(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
}

/// UDP listener for Access-Requests
pub struct PacketServer {
    socket: Arc<UdpSocket>,
    secret: Arc<[u8]>,
    handler: Arc<dyn RadiusHandler>,
    shutdown_tx: watch::Sender<bool>,
    in_flight: Arc<InFlight>,
}

impl PacketServer {
    pub async fn bind(
        addr: SocketAddr,
        secret: impl Into<Vec<u8>>,
        handler: Arc<dyn RadiusHandler>,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("RADIUS server listening on {}", socket.local_addr()?);

        let (shutdown_tx, _) = watch::channel(false);
        Ok(PacketServer {
            socket: Arc::new(socket),
            secret: Arc::from(secret.into()),
            handler,
            shutdown_tx,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// Useful when bound to port 0
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive and dispatch requests until [`PacketServer::shutdown`] is called
    pub async fn serve(&self) -> Result<(), TransportError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown_rx) => return Ok(()),
                received = self.socket.recv_from(&mut buf) => {
                    let (len, addr) = received?;
                    self.dispatch(&buf[..len], addr);
                }
            }
        }
    }

    fn dispatch(&self, data: &[u8], addr: SocketAddr) {
        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(client_ip = %addr.ip(), error = %e, "Dropping malformed packet");
                return;
            }
        };
        if packet.code != Code::AccessRequest {
            warn!(
                client_ip = %addr.ip(),
                packet_type = ?packet.code,
                "Dropping unsupported packet type"
            );
            return;
        }

        debug!(
            client_addr = %addr,
            request_id = packet.identifier,
            "Received Access-Request"
        );

        let Some(guard) = self.in_flight.enter() else {
            debug!(client_addr = %addr, "Dropping request received during shutdown");
            return;
        };
        let request = IncomingRequest::new(addr, packet, Arc::clone(&self.secret));
        let mut writer = UdpResponseWriter::new(Arc::clone(&self.socket), addr);
        let handler = Arc::clone(&self.handler);

        tokio::spawn(async move {
            let _guard = guard;
            handler.serve_radius(&mut writer, &request).await;
        });
    }

    /// Stop receiving and wait for in-flight requests to be answered
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.shutdown_tx.send_replace(true);
        self.in_flight.close();
        self.in_flight.wait_idle().await;
        info!("RADIUS server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpradius_proto::auth::{encrypt_user_password, verify_response_authenticator};
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tokio::time::timeout;

    struct AcceptAll;

    #[async_trait]
    impl RadiusHandler for AcceptAll {
        async fn serve_radius(&self, writer: &mut dyn ResponseWriter, request: &IncomingRequest) {
            let response = request.response(Code::AccessAccept, Vec::new()).unwrap();
            writer.write(response).await.unwrap();
        }
    }

    /// Holds every request until released
    struct Gate(Mutex<()>);

    #[async_trait]
    impl RadiusHandler for Gate {
        async fn serve_radius(&self, writer: &mut dyn ResponseWriter, request: &IncomingRequest) {
            let _open = self.0.lock().await;
            let response = request.response(Code::AccessReject, Vec::new()).unwrap();
            writer.write(response).await.unwrap();
        }
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RadiusHandler for Counting {
        async fn serve_radius(&self, writer: &mut dyn ResponseWriter, request: &IncomingRequest) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = request.response(Code::AccessAccept, Vec::new()).unwrap();
            let _ = writer.write(response).await;
        }
    }

    fn request_packet(identifier: u8) -> Packet {
        Packet::new(Code::AccessRequest, identifier, [3u8; 16])
    }

    async fn exchange(server: SocketAddr, packet: &Packet) -> Packet {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&packet.encode().unwrap(), server).await.unwrap();

        let mut buf = [0u8; 4096];
        let (len, _) = timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        Packet::decode(&buf[..len]).unwrap()
    }

    #[test]
    fn test_incoming_request_credentials() {
        let mut packet = request_packet(1);
        packet.add_attribute(Attribute::string(AttributeType::UserName, "alice").unwrap());
        let hidden = encrypt_user_password("654321", b"secret", &packet.authenticator);
        packet.add_attribute(Attribute::new(AttributeType::UserPassword.as_u8(), hidden).unwrap());

        let request = IncomingRequest::new("127.0.0.1:1".parse().unwrap(), packet, Arc::from(&b"secret"[..]));
        assert_eq!(request.username(), "alice");
        assert_eq!(request.password().unwrap(), "654321");
    }

    #[test]
    fn test_incoming_request_without_credentials() {
        let request = IncomingRequest::new(
            "127.0.0.1:1".parse().unwrap(),
            request_packet(1),
            Arc::from(&b"secret"[..]),
        );
        assert_eq!(request.username(), "");
        assert_eq!(request.password().unwrap(), "");
    }

    #[tokio::test]
    async fn test_writer_writes_once() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let target = socket.local_addr().unwrap();
        let mut writer = UdpResponseWriter::new(Arc::clone(&socket), target);

        let reply = Packet::new(Code::AccessReject, 1, [0u8; 16]);
        writer.write(reply.clone()).await.unwrap();
        assert!(matches!(
            writer.write(reply).await,
            Err(TransportError::AlreadyWritten)
        ));
    }

    #[tokio::test]
    async fn test_serves_signed_reply() {
        let server = Arc::new(
            PacketServer::bind("127.0.0.1:0".parse().unwrap(), "testing123", Arc::new(AcceptAll))
                .await
                .unwrap(),
        );
        let addr = server.local_addr().unwrap();
        let serving = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve().await }
        });

        let request = request_packet(9);
        let reply = exchange(addr, &request).await;
        assert_eq!(reply.code, Code::AccessAccept);
        assert_eq!(reply.identifier, 9);
        assert!(verify_response_authenticator(&reply, &request.authenticator, b"testing123"));

        server.shutdown().await.unwrap();
        timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_ignores_garbage_and_replies() {
        let server = Arc::new(
            PacketServer::bind("127.0.0.1:0".parse().unwrap(), "testing123", Arc::new(AcceptAll))
                .await
                .unwrap(),
        );
        let addr = server.local_addr().unwrap();
        tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve().await }
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&[1, 2, 3], addr).await.unwrap();
        let accept = Packet::new(Code::AccessAccept, 5, [0u8; 16]);
        client.send_to(&accept.encode().unwrap(), addr).await.unwrap();

        let mut buf = [0u8; 64];
        assert!(timeout(Duration::from_millis(300), client.recv_from(&mut buf))
            .await
            .is_err());

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_requests() {
        let gate = Arc::new(Gate(Mutex::new(())));
        let held = gate.0.lock().await;

        let server = Arc::new(
            PacketServer::bind("127.0.0.1:0".parse().unwrap(), "testing123", gate.clone())
                .await
                .unwrap(),
        );
        let addr = server.local_addr().unwrap();
        tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve().await }
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&request_packet(1).encode().unwrap(), addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stopping = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.shutdown().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stopping.is_finished());

        drop(held);
        timeout(Duration::from_secs(5), stopping)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let mut buf = [0u8; 4096];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(Packet::decode(&buf[..len]).unwrap().code, Code::AccessReject);
    }

    #[tokio::test]
    async fn test_shutdown_before_serve() {
        let server = PacketServer::bind("127.0.0.1:0".parse().unwrap(), "s", Arc::new(AcceptAll))
            .await
            .unwrap();
        server.shutdown().await.unwrap();
        timeout(Duration::from_secs(1), server.serve())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_dispatch_after_shutdown() {
        let handler = Arc::new(Counting::default());
        let server = PacketServer::bind("127.0.0.1:0".parse().unwrap(), "s", handler.clone())
            .await
            .unwrap();
        server.shutdown().await.unwrap();

        let client: SocketAddr = "127.0.0.1:9".parse().unwrap();
        server.dispatch(&request_packet(1).encode().unwrap(), client);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(server.in_flight.count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_closed_in_flight_refuses_entry() {
        let in_flight = Arc::new(InFlight::default());
        let guard = in_flight.enter();
        assert!(guard.is_some());
        assert_eq!(in_flight.count.load(Ordering::SeqCst), 1);

        in_flight.close();
        assert!(in_flight.enter().is_none());
        assert_eq!(in_flight.count.load(Ordering::SeqCst), 1);

        drop(guard);
        assert_eq!(in_flight.count.load(Ordering::SeqCst), 0);
    }
}
