/// RADIUS attribute types the gateway reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeType {
    /// User-Name (1) - RFC 2865
    UserName = 1,
    /// User-Password (2) - RFC 2865, hidden with the shared secret
    UserPassword = 2,
    /// NAS-IP-Address (4) - RFC 2865
    NasIpAddress = 4,
    /// Reply-Message (18) - RFC 2865
    ReplyMessage = 18,
    /// State (24) - RFC 2865
    State = 24,
    /// Proxy-State (33) - RFC 2865, echoed verbatim in replies
    ProxyState = 33,
    /// EAP-Message (79) - RFC 3579
    ///
    /// An EAP frame longer than 253 bytes is split across consecutive
    /// EAP-Message attributes.
    EapMessage = 79,
}

impl AttributeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AttributeType::UserName),
            2 => Some(AttributeType::UserPassword),
            4 => Some(AttributeType::NasIpAddress),
            18 => Some(AttributeType::ReplyMessage),
            24 => Some(AttributeType::State),
            33 => Some(AttributeType::ProxyState),
            79 => Some(AttributeType::EapMessage),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
