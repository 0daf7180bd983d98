use super::{AuthError, Authenticator, Request, Response};
use otpradius_proto::eap::{self, Message};
use otpradius_proto::AttributeType;
use tracing::debug;

/// EAP front end.
///
/// Reassembles and decodes the EAP-Message carried by the request, then
/// stops: PEAP negotiation and the MSCHAPv2 exchange inside it are not
/// implemented, so every request ends in [`AuthError::Unimplemented`] and
/// nothing is ever approved.
#[derive(Debug, Clone, Default)]
pub struct EapAuthenticator;

impl EapAuthenticator {
    pub fn new() -> Self {
        EapAuthenticator
    }
}

impl Authenticator for EapAuthenticator {
    fn authenticate(&self, request: &Request) -> Result<Response, AuthError> {
        let fragments: Vec<&[u8]> = request
            .attributes
            .iter()
            .filter(|attr| attr.is(AttributeType::EapMessage))
            .map(|attr| attr.value.as_slice())
            .collect();
        if fragments.is_empty() {
            return Err(AuthError::MissingEapMessage);
        }

        let packet = eap::Packet::decode(&fragments.concat())?;
        match packet.decode_data()? {
            Some(Message::Identity(identity)) => debug!(
                eap_identifier = packet.identifier,
                identity = %identity.identity,
                "EAP identity received"
            ),
            None => debug!(
                eap_identifier = packet.identifier,
                code = ?packet.code,
                "EAP packet without data"
            ),
        }

        // TODO: PEAP tunnel and EAP-MSCHAPv2 inner method against an identity store
        Err(AuthError::Unimplemented("EAP tunnel negotiation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpradius_proto::eap::{Code, EapError};
    use otpradius_proto::Attribute;
    use std::time::SystemTime;

    fn request(attributes: Vec<Attribute>) -> Request {
        Request {
            remote_addr: "192.0.2.10:1645".parse().unwrap(),
            timestamp: SystemTime::now(),
            username: "alice".to_string(),
            password: String::new(),
            attributes,
        }
    }

    #[test]
    fn test_missing_eap_message() {
        let result = EapAuthenticator::new().authenticate(&request(Vec::new()));
        assert!(matches!(result, Err(AuthError::MissingEapMessage)));
    }

    #[test]
    fn test_malformed_eap_message() {
        let attr = Attribute::new(AttributeType::EapMessage.as_u8(), vec![2, 1, 0, 40, 1]).unwrap();
        let result = EapAuthenticator::new().authenticate(&request(vec![attr]));
        assert!(matches!(
            result,
            Err(AuthError::Eap(EapError::MalformedPacket(_)))
        ));
    }

    #[test]
    fn test_notification_is_unimplemented() {
        let frame = eap::Packet::new(Code::Request, 1, vec![2, b'h', b'i']).unwrap().encode();
        let attr = Attribute::new(AttributeType::EapMessage.as_u8(), frame).unwrap();
        let result = EapAuthenticator::new().authenticate(&request(vec![attr]));
        assert!(matches!(
            result,
            Err(AuthError::Eap(EapError::Unimplemented(_)))
        ));
    }

    #[test]
    fn test_identity_never_approved() {
        let frame = eap::Packet::identity(Code::Response, 4, "alice").unwrap().encode();
        let attr = Attribute::new(AttributeType::EapMessage.as_u8(), frame).unwrap();
        let result = EapAuthenticator::new().authenticate(&request(vec![attr]));
        assert!(matches!(result, Err(AuthError::Unimplemented(_))));
    }

    #[test]
    fn test_fragments_reassembled() {
        let identity = "x".repeat(400);
        let frame = eap::Packet::identity(Code::Response, 4, &identity).unwrap().encode();
        let attrs = Attribute::fragmented(AttributeType::EapMessage, &frame);
        assert!(attrs.len() > 1);

        let result = EapAuthenticator::new().authenticate(&request(attrs));
        assert!(matches!(result, Err(AuthError::Unimplemented(_))));
    }
}
