//! Instrument lookup keys.

use std::fmt;

/// Separator placed between subsystem and name.
pub const KEY_SEPARATOR: char = '/';

/// Pool key for an instrument: `subsystem/name`.
///
/// Help text and label names are deliberately not part of the key, so two
/// requests that differ only in metadata resolve to the same instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentKey {
    joined: String,
    split: usize,
}

impl InstrumentKey {
    /// Join a subsystem and a name into a key.
    pub fn new(subsystem: &str, name: &str) -> Self {
        let mut joined = String::with_capacity(subsystem.len() + name.len() + 1);
        joined.push_str(subsystem);
        joined.push(KEY_SEPARATOR);
        joined.push_str(name);
        Self {
            joined,
            split: subsystem.len(),
        }
    }

    /// The full `subsystem/name` string.
    pub fn as_str(&self) -> &str {
        &self.joined
    }

    /// The subsystem part.
    pub fn subsystem(&self) -> &str {
        &self.joined[..self.split]
    }

    /// The name part.
    pub fn name(&self) -> &str {
        &self.joined[self.split + KEY_SEPARATOR.len_utf8()..]
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined)
    }
}

impl AsRef<str> for InstrumentKey {
    fn as_ref(&self) -> &str {
        &self.joined
    }
}
