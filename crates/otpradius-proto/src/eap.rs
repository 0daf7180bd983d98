//! EAP (Extensible Authentication Protocol) framing
//!
//! Implements the outer EAP packet format of RFC 3748 Section 4 as carried
//! in RADIUS EAP-Message attributes (RFC 3579), plus the Identity
//! Request/Response type of RFC 3748 Section 5.1.
//!
//! # EAP Packet Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Data ...
//! +-+-+-+-+-
//! ```
//!
//! For Request and Response packets the first data octet is the
//! Request/Response type. Only Identity is decoded further; Notification is
//! recognised but reported as unimplemented.

use thiserror::Error;

/// EAP-related errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EapError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("unsupported request-response type: {0}")]
    UnsupportedRequestResponseType(u8),

    #[error("request-response type mismatch")]
    RequestResponseTypeMismatch,

    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}

/// EAP packet code (first byte of an EAP packet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Code {
    Request = 1,
    Response = 2,
    Success = 3,
    Failure = 4,
}

impl Code {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Code::Request),
            2 => Some(Code::Response),
            3 => Some(Code::Success),
            4 => Some(Code::Failure),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Request/Response type carried in the first data octet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestResponseType {
    Identity = 1,
    Notification = 2,
}

impl RequestResponseType {
    pub fn from_u8(value: u8) -> Result<Self, EapError> {
        match value {
            1 => Ok(RequestResponseType::Identity),
            2 => Ok(RequestResponseType::Notification),
            other => Err(EapError::UnsupportedRequestResponseType(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded Request/Response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Identity(Identity),
}

/// Identity Request/Response (RFC 3748 Section 5.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Identity reported by the peer, or the prompt of a Request
    pub identity: String,
}

impl Identity {
    pub fn new(identity: impl Into<String>) -> Self {
        Identity {
            identity: identity.into(),
        }
    }

    /// Decode the packet data of an Identity Request/Response, type octet
    /// included.
    pub fn decode(data: &[u8]) -> Result<Self, EapError> {
        let Some((&tag, identity)) = data.split_first() else {
            return Err(EapError::MalformedPacket(
                "identity payload has no type octet".to_string(),
            ));
        };
        if RequestResponseType::from_u8(tag).ok() != Some(RequestResponseType::Identity) {
            return Err(EapError::RequestResponseTypeMismatch);
        }

        Ok(Identity {
            identity: String::from_utf8_lossy(identity).into_owned(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(1 + self.identity.len());
        data.push(RequestResponseType::Identity.as_u8());
        data.extend_from_slice(self.identity.as_bytes());
        data
    }
}

/// EAP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub code: Code,
    /// Correlates a Response with its Request
    pub identifier: u8,
    /// Total length in octets, header included
    pub length: u16,
    pub data: Vec<u8>,
}

impl Packet {
    pub const HEADER_LENGTH: usize = 4;
    pub const MAX_DATA_LENGTH: usize = u16::MAX as usize - Self::HEADER_LENGTH;

    /// Build a packet whose length matches `data`
    pub fn new(code: Code, identifier: u8, data: Vec<u8>) -> Result<Self, EapError> {
        if data.len() > Self::MAX_DATA_LENGTH {
            return Err(EapError::MalformedPacket(format!(
                "{} data bytes do not fit a 16 bit length",
                data.len()
            )));
        }

        Ok(Packet {
            code,
            identifier,
            length: (Self::HEADER_LENGTH + data.len()) as u16,
            data,
        })
    }

    /// Identity Request or Response
    pub fn identity(code: Code, identifier: u8, identity: &str) -> Result<Self, EapError> {
        Self::new(code, identifier, Identity::new(identity).encode())
    }

    /// Decode an EAP packet.
    ///
    /// The declared Length must be at least the header and must not exceed
    /// `bytes`; octets after Length are link padding and are dropped. The
    /// payload is copied out of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, EapError> {
        let &[code, identifier, len_hi, len_lo, ..] = bytes else {
            return Err(EapError::MalformedPacket(format!(
                "packet must be {} or more bytes, got {}",
                Self::HEADER_LENGTH,
                bytes.len()
            )));
        };

        let code = Code::from_u8(code)
            .ok_or_else(|| EapError::MalformedPacket(format!("unknown code {}", code)))?;
        let length = u16::from_be_bytes([len_hi, len_lo]);
        let declared = length as usize;

        if declared < Self::HEADER_LENGTH {
            return Err(EapError::MalformedPacket(format!(
                "declared length {} is shorter than the header",
                declared
            )));
        }
        if declared > bytes.len() {
            return Err(EapError::MalformedPacket(format!(
                "declared length {} exceeds the {} bytes received",
                declared,
                bytes.len()
            )));
        }

        Ok(Packet {
            code,
            identifier,
            length,
            data: bytes[Self::HEADER_LENGTH..declared].to_vec(),
        })
    }

    /// Encode to exactly `length` bytes
    pub fn encode(&self) -> Vec<u8> {
        let total = (self.length as usize).max(Self::HEADER_LENGTH);
        let mut bytes = vec![0u8; total];

        bytes[0] = self.code.as_u8();
        bytes[1] = self.identifier;
        bytes[2..4].copy_from_slice(&self.length.to_be_bytes());

        let body = &mut bytes[Self::HEADER_LENGTH..];
        let copied = body.len().min(self.data.len());
        body[..copied].copy_from_slice(&self.data[..copied]);

        bytes
    }

    /// Decode the Request/Response payload.
    ///
    /// Returns `Ok(None)` for packets without data (Success, Failure or an
    /// empty Request/Response).
    pub fn decode_data(&self) -> Result<Option<Message>, EapError> {
        let Some(&tag) = self.data.first() else {
            return Ok(None);
        };

        match RequestResponseType::from_u8(tag)? {
            RequestResponseType::Identity => {
                Identity::decode(&self.data).map(|identity| Some(Message::Identity(identity)))
            }
            RequestResponseType::Notification => {
                Err(EapError::Unimplemented("notification decoding"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_conversion() {
        assert_eq!(Code::from_u8(1), Some(Code::Request));
        assert_eq!(Code::from_u8(4), Some(Code::Failure));
        assert_eq!(Code::from_u8(0), None);
        assert_eq!(Code::from_u8(5), None);
        assert_eq!(Code::Response.as_u8(), 2);
    }

    #[test]
    fn test_encode_layout() {
        let packet = Packet::new(Code::Response, 7, vec![1, b'b', b'o', b'b']).unwrap();
        assert_eq!(packet.length, 8);
        assert_eq!(packet.encode(), vec![2, 7, 0, 8, 1, b'b', b'o', b'b']);
    }

    #[test]
    fn test_round_trip() {
        let packets = [
            Packet::identity(Code::Request, 0, "").unwrap(),
            Packet::identity(Code::Response, 200, "alice@example.com").unwrap(),
            Packet::new(Code::Success, 3, Vec::new()).unwrap(),
            Packet::new(Code::Failure, 255, Vec::new()).unwrap(),
            Packet::new(Code::Request, 9, vec![25, 0x20, 0x01]).unwrap(),
        ];

        for packet in packets {
            let bytes = packet.encode();
            assert_eq!(bytes.len(), packet.length as usize);
            assert_eq!(Packet::decode(&bytes).unwrap(), packet);
        }
    }

    #[test]
    fn test_decode_too_short() {
        for len in 0..4 {
            let err = Packet::decode(&[1u8, 1, 0, 4][..len]).unwrap_err();
            assert!(matches!(err, EapError::MalformedPacket(_)));
        }
    }

    #[test]
    fn test_decode_unknown_code() {
        assert!(matches!(
            Packet::decode(&[9, 1, 0, 4]),
            Err(EapError::MalformedPacket(_))
        ));
        assert!(matches!(
            Packet::decode(&[0, 1, 0, 4]),
            Err(EapError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_decode_length_exceeds_buffer() {
        let err = Packet::decode(&[2, 1, 0, 10, 1, b'x']).unwrap_err();
        assert!(matches!(err, EapError::MalformedPacket(_)));
    }

    #[test]
    fn test_decode_length_below_header() {
        let err = Packet::decode(&[2, 1, 0, 3, 1]).unwrap_err();
        assert!(matches!(err, EapError::MalformedPacket(_)));
    }

    #[test]
    fn test_decode_drops_padding() {
        let packet = Packet::decode(&[2, 1, 0, 6, 1, b'x', 0xAA, 0xBB]).unwrap();
        assert_eq!(packet.length, 6);
        assert_eq!(packet.data, vec![1, b'x']);
    }

    #[test]
    fn test_decode_copies_input() {
        let mut buf = Packet::identity(Code::Response, 1, "bob").unwrap().encode();
        let packet = Packet::decode(&buf).unwrap();
        buf[5] = b'X';
        assert_eq!(packet.data, vec![1, b'b', b'o', b'b']);
    }

    #[test]
    fn test_decode_data_identity() {
        let packet = Packet::identity(Code::Response, 1, "alice").unwrap();
        assert_eq!(
            packet.decode_data().unwrap(),
            Some(Message::Identity(Identity::new("alice")))
        );
    }

    #[test]
    fn test_decode_data_empty() {
        let packet = Packet::new(Code::Success, 1, Vec::new()).unwrap();
        assert_eq!(packet.decode_data().unwrap(), None);
    }

    #[test]
    fn test_decode_data_notification_unimplemented() {
        let packet = Packet::new(Code::Request, 1, vec![2, b'h', b'i']).unwrap();
        assert!(matches!(
            packet.decode_data(),
            Err(EapError::Unimplemented(_))
        ));
    }

    #[test]
    fn test_decode_data_unsupported_type() {
        let packet = Packet::new(Code::Response, 1, vec![26, 0, 0]).unwrap();
        assert_eq!(
            packet.decode_data(),
            Err(EapError::UnsupportedRequestResponseType(26))
        );
    }

    #[test]
    fn test_identity_decode() {
        assert_eq!(Identity::decode(&[1]).unwrap(), Identity::new(""));
        assert!(matches!(
            Identity::decode(&[]),
            Err(EapError::MalformedPacket(_))
        ));
        assert_eq!(
            Identity::decode(&[2, b'x']),
            Err(EapError::RequestResponseTypeMismatch)
        );
    }

    #[test]
    fn test_new_rejects_oversized_data() {
        assert!(Packet::new(Code::Request, 1, vec![0u8; Packet::MAX_DATA_LENGTH]).is_ok());
        assert!(Packet::new(Code::Request, 1, vec![0u8; Packet::MAX_DATA_LENGTH + 1]).is_err());
    }
}
