//! Opaque identifiers shared by every entity in the system.
//!
//! Ids are 26 lowercase base32 characters encoding a random v4 UUID. Tokens and
//! trigger ids use the same shape.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

pub const ID_LENGTH: usize = 26;

const ALPHABET: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";

/// Generates a fresh 26-character id.
pub fn new_id() -> String {
    encode_base32(Uuid::new_v4().as_bytes())
}

pub fn is_valid_id(value: &str) -> bool {
    value.len() == ID_LENGTH && value.bytes().all(|byte| ALPHABET.contains(&byte))
}

fn encode_base32(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(ID_LENGTH);
    let mut buffer = 0u32;
    let mut bits = 0u32;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            output.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }

    if bits > 0 {
        output.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    output
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(new_id())
            }

            /// Accepts only well-formed ids; anything else is a malformed request.
            pub fn parse(raw: &str) -> Result<Self, DomainError> {
                if is_valid_id(raw) {
                    Ok(Self(raw.to_owned()))
                } else {
                    Err(DomainError::MalformedId(raw.to_owned()))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_type!(CommandId);
id_type!(TeamId);
id_type!(ChannelId);
id_type!(UserId);
id_type!(
    /// Correlation handle minted for every successful execution.
    TriggerId
);

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{is_valid_id, new_id, CommandId, ID_LENGTH};

    #[test]
    fn generated_ids_have_fixed_length_and_alphabet() {
        for _ in 0..64 {
            let id = new_id();
            assert_eq!(id.len(), ID_LENGTH);
            assert!(is_valid_id(&id), "{id} should be a valid id");
        }
    }

    #[test]
    fn generated_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..500).map(|_| new_id()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(CommandId::parse("junk").is_err());
        assert!(CommandId::parse(&"Z".repeat(ID_LENGTH)).is_err());
        assert!(CommandId::parse(&new_id()).is_ok());
    }
}
