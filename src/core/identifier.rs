//! Namespaced identifiers (`namespace:path`).
//!
//! Every registry in the crate is keyed by an [`Identifier`]. Both halves are
//! validated on construction, so an `Identifier` value is always well formed.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ProtocolError, Result};

/// Namespace used by [`Identifier::parse`] when the input has no colon.
pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// Namespace owning every registry this crate creates.
pub const CANDLE_NAMESPACE: &str = "candlemc";

/// An immutable `namespace:path` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    namespace: Cow<'static, str>,
    path: Cow<'static, str>,
}

impl Identifier {
    /// Build an identifier from its two halves.
    ///
    /// The namespace accepts `[a-z0-9_.-]+`, the path additionally accepts `/`.
    pub fn new(namespace: impl Into<String>, path: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let path = path.into();

        if !is_valid_namespace(&namespace) {
            return Err(ProtocolError::InvalidIdentifier(format!(
                "invalid namespace: {namespace:?}"
            )));
        }
        if !is_valid_path(&path) {
            return Err(ProtocolError::InvalidIdentifier(format!(
                "invalid path: {path:?}"
            )));
        }

        Ok(Self {
            namespace: Cow::Owned(namespace),
            path: Cow::Owned(path),
        })
    }

    /// Compile-time constructor for identifiers spelled out in this crate.
    ///
    /// Skips validation; every call site is covered by `test_static_identifiers_are_valid`.
    pub(crate) const fn from_static(namespace: &'static str, path: &'static str) -> Self {
        Self {
            namespace: Cow::Borrowed(namespace),
            path: Cow::Borrowed(path),
        }
    }

    /// `candlemc:<prefix>/<version>`, the key shape used for per-version registries.
    pub(crate) fn versioned(prefix: &str, version: i32) -> Self {
        Self {
            namespace: Cow::Borrowed(CANDLE_NAMESPACE),
            path: Cow::Owned(format!("{prefix}/{version}")),
        }
    }

    /// Parse `namespace:path`, defaulting to [`DEFAULT_NAMESPACE`] when no colon is present.
    pub fn parse(combined: &str) -> Result<Self> {
        match combined.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::new(DEFAULT_NAMESPACE, combined),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn is_valid_namespace(ns: &str) -> bool {
    !ns.is_empty()
        && ns
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-'))
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' | b'/'))
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl FromStr for Identifier {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Serialized as the display string so a tampered file cannot smuggle in an
// identifier that skipped validation.
impl Serialize for Identifier {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Identifier::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifier() {
        let id = Identifier::new("candlemc", "packet_registry/769").unwrap();
        assert_eq!(id.namespace(), "candlemc");
        assert_eq!(id.path(), "packet_registry/769");
        assert_eq!(id.to_string(), "candlemc:packet_registry/769");
    }

    #[test]
    fn test_namespace_rejects_slash() {
        assert!(Identifier::new("candle/mc", "codec").is_err());
    }

    #[test]
    fn test_rejects_uppercase_and_empty() {
        assert!(Identifier::new("Candle", "codec").is_err());
        assert!(Identifier::new("candlemc", "Codec").is_err());
        assert!(Identifier::new("", "codec").is_err());
        assert!(Identifier::new("candlemc", "").is_err());
    }

    #[test]
    fn test_parse_defaults_namespace() {
        let id = Identifier::parse("var_int").unwrap();
        assert_eq!(id.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(id.path(), "var_int");

        let id: Identifier = "candlemc:codec/769".parse().unwrap();
        assert_eq!(id.namespace(), "candlemc");
        assert_eq!(id.path(), "codec/769");
    }

    #[test]
    fn test_static_identifiers_are_valid() {
        use crate::core::types::{LONG, STRING, UNSIGNED_SHORT, UUID, VAR_INT};
        use crate::registry::registries::PACKET_REGISTRIES_ID;
        use crate::transport::server::DATA_CODECS_ID;

        for id in [
            VAR_INT.identifier(),
            STRING.identifier(),
            UNSIGNED_SHORT.identifier(),
            LONG.identifier(),
            UUID.identifier(),
            &PACKET_REGISTRIES_ID,
            &DATA_CODECS_ID,
        ] {
            let reparsed = Identifier::parse(&id.to_string()).unwrap();
            assert_eq!(&reparsed, id);
        }

        for version in [0, 769, -1] {
            let id = Identifier::versioned("packet_registry", version);
            assert_eq!(Identifier::parse(&id.to_string()).unwrap(), id);
        }
    }

    #[test]
    fn test_parse_rejects_second_colon_in_path() {
        assert!(Identifier::parse("a:b:c").is_err());
    }

    #[test]
    fn test_bincode_roundtrip_revalidates() {
        let id = Identifier::new("minecraft", "uuid").unwrap();
        let bytes = bincode::serialize(&id).unwrap();
        let back: Identifier = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, id);

        let bad = bincode::serialize("BAD:Path").unwrap();
        assert!(bincode::deserialize::<Identifier>(&bad).is_err());
    }
}
