use crate::packet::{Packet, PacketError};
use rand::Rng;

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 Section 3
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut rng = rand::rng();
    let mut authenticator = [0u8; 16];
    rng.fill(&mut authenticator);
    authenticator
}

/// Calculate Response Authenticator per RFC 2865 Section 3
///
/// Response Authenticator = MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let mut signed = Packet {
        authenticator: *request_authenticator,
        ..packet.clone()
    }
    .encode()?;
    signed.extend_from_slice(secret);

    Ok(md5::compute(&signed).0)
}

/// Check a reply against the request it answers
pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    calculate_response_authenticator(response, request_authenticator, secret)
        .map(|expected| expected == response.authenticator)
        .unwrap_or(false)
}

/// Hide a User-Password per RFC 2865 Section 5.2
///
/// The password is NUL-padded to a multiple of 16 bytes, then each block is
/// XORed with MD5(secret + previous ciphertext block), the first block using
/// the Request Authenticator.
pub fn encrypt_user_password(password: &str, secret: &[u8], authenticator: &[u8; 16]) -> Vec<u8> {
    let mut padded = password.as_bytes().to_vec();
    let padded_len = padded.len().div_ceil(16).max(1) * 16;
    padded.resize(padded_len, 0);

    let mut result = Vec::with_capacity(padded_len);
    let mut previous: [u8; 16] = *authenticator;

    for chunk in padded.chunks(16) {
        let hash = password_block_key(secret, &previous);
        for (i, byte) in chunk.iter().enumerate() {
            previous[i] = byte ^ hash[i];
        }
        result.extend_from_slice(&previous);
    }

    result
}

/// Recover a User-Password hidden per RFC 2865 Section 5.2
pub fn decrypt_user_password(
    encrypted: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<String, PacketError> {
    if encrypted.is_empty() || encrypted.len() % 16 != 0 || encrypted.len() > 128 {
        return Err(PacketError::AttributeError(format!(
            "User-Password must be 16-128 bytes in 16 byte blocks, got {}",
            encrypted.len()
        )));
    }

    let mut result = Vec::with_capacity(encrypted.len());
    let mut previous: &[u8] = authenticator;

    for chunk in encrypted.chunks(16) {
        let hash = password_block_key(secret, previous);
        result.extend(chunk.iter().zip(hash.iter()).map(|(c, h)| c ^ h));
        previous = chunk;
    }

    while result.last() == Some(&0) {
        result.pop();
    }

    String::from_utf8(result)
        .map_err(|e| PacketError::AttributeError(format!("User-Password is not UTF-8: {}", e)))
}

fn password_block_key(secret: &[u8], previous: &[u8]) -> [u8; 16] {
    let mut context = md5::Context::new();
    context.consume(secret);
    context.consume(previous);
    context.compute().0
}
