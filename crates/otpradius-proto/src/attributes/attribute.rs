use super::AttributeType;
use crate::packet::PacketError;

/// RADIUS Attribute as defined in RFC 2865 Section 5
///
/// ```text
///  0                   1                   2
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     |  Value ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute type (1 byte)
    pub attr_type: u8,
    /// Attribute value (0-253 bytes)
    pub value: Vec<u8>,
}

impl Attribute {
    /// Type and length fields
    pub const HEADER_LENGTH: usize = 2;
    /// Largest encoded attribute, header included
    pub const MAX_LENGTH: usize = 255;
    /// Largest value that fits in one attribute
    pub const MAX_VALUE_LENGTH: usize = Self::MAX_LENGTH - Self::HEADER_LENGTH;

    pub fn new(attr_type: u8, value: Vec<u8>) -> Result<Self, PacketError> {
        if value.len() > Self::MAX_VALUE_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "value of attribute {} is {} bytes (max {})",
                attr_type,
                value.len(),
                Self::MAX_VALUE_LENGTH
            )));
        }
        Ok(Attribute { attr_type, value })
    }

    /// Create a text attribute
    pub fn string(attr_type: AttributeType, value: impl Into<String>) -> Result<Self, PacketError> {
        Self::new(attr_type.as_u8(), value.into().into_bytes())
    }

    /// Split `data` over as many attributes of `attr_type` as needed.
    ///
    /// Used for EAP-Message, where one EAP frame may exceed a single
    /// attribute (RFC 3579 Section 3.1).
    pub fn fragmented(attr_type: AttributeType, data: &[u8]) -> Vec<Self> {
        data.chunks(Self::MAX_VALUE_LENGTH)
            .map(|chunk| Attribute {
                attr_type: attr_type.as_u8(),
                value: chunk.to_vec(),
            })
            .collect()
    }

    /// Append the encoded attribute to `buffer`
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> Result<(), PacketError> {
        let length = self.encoded_length();
        if length > Self::MAX_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "encoded attribute {} is {} bytes",
                self.attr_type, length
            )));
        }

        buffer.push(self.attr_type);
        buffer.push(length as u8);
        buffer.extend_from_slice(&self.value);
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut buffer = Vec::with_capacity(self.encoded_length());
        self.encode_into(&mut buffer)?;
        Ok(buffer)
    }

    /// Decode the attribute at the start of `data`
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let &[attr_type, length, ..] = data else {
            return Err(PacketError::AttributeError(format!(
                "attribute header needs 2 bytes, got {}",
                data.len()
            )));
        };
        let length = length as usize;

        if length < Self::HEADER_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "invalid length {} for attribute {}",
                length, attr_type
            )));
        }
        if data.len() < length {
            return Err(PacketError::AttributeError(format!(
                "attribute {} declares {} bytes but only {} remain",
                attr_type,
                length,
                data.len()
            )));
        }

        Ok(Attribute {
            attr_type,
            value: data[Self::HEADER_LENGTH..length].to_vec(),
        })
    }

    pub fn encoded_length(&self) -> usize {
        Self::HEADER_LENGTH + self.value.len()
    }

    pub fn is(&self, attr_type: AttributeType) -> bool {
        self.attr_type == attr_type.as_u8()
    }

    /// Interpret the value as UTF-8 text
    pub fn as_string(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.value.clone())
    }
}
