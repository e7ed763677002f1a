//! Room codes

use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::RoomError;

pub const ROOM_CODE_LEN: usize = 6;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Six characters from `[A-Z0-9]`, always stored uppercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parse user input. Case-insensitive, surrounding whitespace ignored.
    pub fn parse(input: &str) -> Result<Self, RoomError> {
        let code = input.trim().to_ascii_uppercase();
        let valid = code.len() == ROOM_CODE_LEN
            && code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if !valid {
            return Err(RoomError::InvalidCode(input.to_string()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomCode {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
