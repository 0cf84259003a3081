use sha2::{Digest, Sha256};

/// Hex SHA-256 of a scheme's canonical serialization
pub fn digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}
