//! Opaque file handles.
//!
//! No code outside `komposer-registry` may construct a [`FileHandle`] from a
//! path — the handle is a value type whose only producer is the registry's
//! ID allocator (spec §9 "Opaque-handle discipline").

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An opaque, process-local identifier for a file.
///
/// Renders as `file_<8hex>`. Equality and hashing are on the token only;
/// two handles with the same token are the same file for the lifetime of
/// the process. Serializes as that same string, not the bare integer, since
/// it crosses the tool surface as `file_<8hex>` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub(crate) u32);

impl Serialize for FileHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FileHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HandleVisitor;

        impl Visitor<'_> for HandleVisitor {
            type Value = FileHandle;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string of shape file_<8hex>")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(HandleVisitor)
    }
}

impl FileHandle {
    /// Constructs a handle from a raw 32-bit token.
    ///
    /// Only `komposer-registry` should call this; it is `pub` (not
    /// `pub(crate)`) so the registry crate, which depends on this one, can
    /// reach it, but every other crate should treat `FileHandle` as opaque.
    pub fn from_raw(token: u32) -> Self {
        FileHandle(token)
    }

    /// Returns the raw token, e.g. for logging.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file_{:08x}", self.0)
    }
}

impl std::str::FromStr for FileHandle {
    type Err = ParseHandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("file_").ok_or(ParseHandleError)?;
        let token = u32::from_str_radix(hex, 16).map_err(|_| ParseHandleError)?;
        Ok(FileHandle(token))
    }
}

/// Returned when a string doesn't look like `file_<8hex>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseHandleError;

impl fmt::Display for ParseHandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a valid file handle (expected file_<8hex>)")
    }
}

impl std::error::Error for ParseHandleError {}

/// Lifecycle class of a registered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleClass {
    /// A read-only input under a source root.
    Source,
    /// An Executor output, kept around as a debuggable byproduct.
    Generated,
    /// An intermediate output eligible for `cleanup_temp`.
    Temp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_round_trip() {
        let h = FileHandle::from_raw(0xDEAD_BEEF);
        let s = h.to_string();
        assert_eq!(s, "file_deadbeef");
        let parsed: FileHandle = s.parse().unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn parse_rejects_bad_shape() {
        assert!("not_a_handle".parse::<FileHandle>().is_err());
        assert!("file_zzzzzzzz".parse::<FileHandle>().is_err());
    }
}
