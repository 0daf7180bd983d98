//! RADIUS and EAP wire formats for the otpradius gateway
//!
//! This crate covers the parts of RFC 2865 and RFC 3748/3579 the gateway
//! speaks: Access-Request decoding, signed Access-Accept/Access-Reject
//! replies, User-Password hiding, and the outer EAP framing with the
//! Identity type.
//!
//! # Example
//!
//! ```rust
//! use otpradius_proto::{Attribute, AttributeType, Code, Packet};
//! use otpradius_proto::auth::{encrypt_user_password, generate_request_authenticator};
//!
//! let req_auth = generate_request_authenticator();
//! let mut packet = Packet::new(Code::AccessRequest, 1, req_auth);
//! packet.add_attribute(Attribute::string(AttributeType::UserName, "alice").unwrap());
//!
//! let hidden = encrypt_user_password("123456", b"secret", &req_auth);
//! packet.add_attribute(Attribute::new(AttributeType::UserPassword.as_u8(), hidden).unwrap());
//!
//! let bytes = packet.encode().unwrap();
//! assert_eq!(Packet::decode(&bytes).unwrap(), packet);
//! ```

pub mod attributes;
pub mod auth;
pub mod eap;
pub mod packet;

pub use attributes::{Attribute, AttributeType};
pub use auth::{
    calculate_response_authenticator, decrypt_user_password, encrypt_user_password,
    generate_request_authenticator, verify_response_authenticator,
};
pub use eap::EapError;
pub use packet::{Code, Packet, PacketError};
