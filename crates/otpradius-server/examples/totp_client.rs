//! Send one Access-Request whose password is the current TOTP code.
//!
//! Useful against a locally running gateway:
//!
//! ```text
//! cargo run --example totp_client -- alice testing123 JBSWY3DPEHPK3PXP 127.0.0.1:51812
//! ```

use otpradius_proto::{
    auth::{encrypt_user_password, generate_request_authenticator, verify_response_authenticator},
    Attribute, AttributeType, Code, Packet,
};
use otpradius_server::Totp;
use std::net::UdpSocket;
use std::time::{Duration, SystemTime};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: {} <username> <secret> <totp-secret> [server_addr]", args[0]);
        eprintln!("Example: {} alice testing123 JBSWY3DPEHPK3PXP 127.0.0.1:51812", args[0]);
        std::process::exit(1);
    }

    let username = &args[1];
    let secret = args[2].as_bytes();
    let totp = Totp::from_base32(&args[3])?;
    let server_addr = args.get(4).map(|s| s.as_str()).unwrap_or("127.0.0.1:51812");

    let code = totp.at(SystemTime::now())?;
    println!("Server: {}", server_addr);
    println!("Username: {}", username);
    println!("Code: {}", code);

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(server_addr)?;

    let request_auth = generate_request_authenticator();
    let mut packet = Packet::new(Code::AccessRequest, 1, request_auth);
    packet.add_attribute(Attribute::string(AttributeType::UserName, username.as_str())?);
    let encrypted_password = encrypt_user_password(&code, secret, &request_auth);
    packet.add_attribute(Attribute::new(AttributeType::UserPassword.as_u8(), encrypted_password)?);
    packet.add_attribute(Attribute::new(AttributeType::NasIpAddress.as_u8(), vec![127, 0, 0, 1])?);

    socket.send(&packet.encode()?)?;

    let mut buffer = vec![0u8; Packet::MAX_PACKET_SIZE];
    socket.set_read_timeout(Some(Duration::from_secs(5)))?;
    let len = match socket.recv(&mut buffer) {
        Ok(len) => len,
        Err(e) => {
            eprintln!("No response from server: {}", e);
            eprintln!("Make sure the gateway is running on {}", server_addr);
            return Err(e.into());
        }
    };

    let response = Packet::decode(&buffer[..len])?;
    if !verify_response_authenticator(&response, &request_auth, secret) {
        eprintln!("Response authenticator does not match; check the shared secret");
    }

    match response.code {
        Code::AccessAccept => println!("Access-Accept"),
        Code::AccessReject => println!("Access-Reject"),
        other => println!("Unexpected response: {:?}", other),
    }
    for attr in response.find_all_attributes(AttributeType::ReplyMessage) {
        if let Ok(msg) = attr.as_string() {
            println!("  Message: {}", msg);
        }
    }

    Ok(())
}
