use std::str::FromStr;

use crate::ModelError;

/// Detach sequence used when none is configured.
pub const DEFAULT_DETACH_KEYS: &str = "ctrl-p,ctrl-q";

/// Parsed detach key sequence.
///
/// The textual form is a comma separated list where each entry is either a single
/// character or `ctrl-<key>`, with `<key>` one of `a`..`z`, `@`, `[`, `\`, `]`, `^`, `_`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetachKeys {
    spec: String,
    bytes: Vec<u8>,
}

impl DetachKeys {
    pub fn parse(spec: &str) -> Result<Self, ModelError> {
        let mut bytes = Vec::new();
        for key in spec.split(',') {
            bytes.push(key_to_byte(key).ok_or_else(|| ModelError::InvalidDetachKeys {
                keys: spec.to_string(),
                key: key.to_string(),
            })?);
        }
        Ok(Self {
            spec: spec.to_string(),
            bytes,
        })
    }

    /// Byte sequence the IO layer watches for on stdin.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The string this sequence was parsed from.
    pub fn as_str(&self) -> &str {
        &self.spec
    }
}

impl Default for DetachKeys {
    fn default() -> Self {
        Self {
            spec: DEFAULT_DETACH_KEYS.to_string(),
            bytes: vec![0x10, 0x11],
        }
    }
}

impl FromStr for DetachKeys {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn key_to_byte(key: &str) -> Option<u8> {
    if let [b] = key.as_bytes() {
        return Some(*b);
    }
    let rest = key
        .get(..5)
        .filter(|p| p.eq_ignore_ascii_case("ctrl-"))
        .map(|_| &key[5..])?;
    match rest.as_bytes() {
        [c @ b'a'..=b'z'] => Some(c - b'a' + 1),
        [c @ b'A'..=b'Z'] => Some(c - b'A' + 1),
        [b'@'] => Some(0),
        [b'['] => Some(27),
        [b'\\'] => Some(28),
        [b']'] => Some(29),
        [b'^'] => Some(30),
        [b'_'] => Some(31),
        _ => None,
    }
}
