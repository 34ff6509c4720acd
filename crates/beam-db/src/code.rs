use std::fmt;

use rand::Rng;

/// Lower, upper, digits: 62 symbols.
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CODE_LENGTH: usize = 4;

/// Short, case-sensitive code a user hands to a peer so the peer can find
/// their account. 62^4 = 14,776,336 possible codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectCode(String);

impl ConnectCode {
    /// Draw a fresh code from the caller's random source.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let code = (0..CODE_LENGTH)
            .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
            .collect();
        Self(code)
    }

    /// Accepts exactly `CODE_LENGTH` characters from the code alphabet.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == CODE_LENGTH && s.bytes().all(|b| CHARSET.contains(&b)) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ConnectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
