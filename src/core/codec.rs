//! # Type Codec Registry
//!
//! [`TypeCodec`] is the read/write contract every primitive wire type implements.
//! A [`DataCodec`] is the per-protocol-version catalog binding identifiers to codec
//! instances, so packet logic asks for "the `minecraft:var_int` codec" rather than
//! calling a concrete decoder. A protocol version can swap an encoding by binding a
//! different codec under the same identifier.
//!
//! [`TypeIdentifier<T>`] ties an identifier to the Rust type its codec produces, so
//! asking the string codec for an integer does not type-check.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::core::identifier::Identifier;
use crate::error::{ProtocolError, Result};
use crate::event::EventBus;
use crate::registry::Registry;

/// Reads and writes one wire type on a shared byte cursor.
///
/// Readers consume exactly the bytes of one value from the front of `buf`.
/// Writers append to `buf` and only fail when a nested codec lookup fails.
pub trait TypeCodec: Send + Sync + 'static {
    /// Rust value produced by this codec.
    type Value: 'static;

    /// Identifier this codec is registered under.
    fn identifier(&self) -> TypeIdentifier<Self::Value>;

    fn read(&self, buf: &mut Bytes, codec: &DataCodec) -> Result<Self::Value>;

    fn write(&self, buf: &mut BytesMut, value: &Self::Value, codec: &DataCodec) -> Result<()>;
}

/// An [`Identifier`] bound to the value type of the codec it names.
pub struct TypeIdentifier<T> {
    id: Identifier,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypeIdentifier<T> {
    pub fn new(id: Identifier) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub(crate) const fn from_static(namespace: &'static str, path: &'static str) -> Self {
        Self {
            id: Identifier::from_static(namespace, path),
            _marker: PhantomData,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.id
    }
}

impl<T> Clone for TypeIdentifier<T> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone())
    }
}

impl<T> PartialEq for TypeIdentifier<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for TypeIdentifier<T> {}

impl<T> fmt::Debug for TypeIdentifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeIdentifier").field(&self.id).finish()
    }
}

impl<T> fmt::Display for TypeIdentifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

/// Holds an `Arc<dyn TypeCodec<Value = T>>` behind `Any` so codecs of different
/// value types share one map.
type ErasedCodec = Arc<dyn Any + Send + Sync>;

/// Per-protocol-version catalog of type codecs (e.g. `candlemc:codec/769`).
pub struct DataCodec {
    codecs: Registry<ErasedCodec>,
}

impl fmt::Debug for DataCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataCodec")
            .field("identifier", self.codecs.identifier())
            .field("codecs", &self.codecs.len())
            .finish()
    }
}

impl DataCodec {
    pub fn new(identifier: Identifier, bus: EventBus) -> Self {
        Self {
            codecs: Registry::new(identifier, bus),
        }
    }

    /// Catalog for one protocol version, keyed `candlemc:codec/<version>`.
    pub fn for_version(version: i32, bus: EventBus) -> Self {
        Self::new(Identifier::versioned("codec", version), bus)
    }

    pub fn identifier(&self) -> &Identifier {
        self.codecs.identifier()
    }

    /// Bind `codec` under its own identifier. Fails if the identifier is taken.
    pub fn register<C: TypeCodec>(&self, codec: C) -> Result<TypeIdentifier<C::Value>> {
        let type_id = codec.identifier();
        let typed: Arc<dyn TypeCodec<Value = C::Value>> = Arc::new(codec);
        let erased: ErasedCodec = Arc::new(typed);
        self.codecs.register(type_id.identifier().clone(), erased)?;
        Ok(type_id)
    }

    pub fn is_registered(&self, id: &Identifier) -> bool {
        self.codecs.is_registered(id)
    }

    /// Decode one `T` from the front of `buf`.
    pub fn read_type<T: 'static>(&self, buf: &mut Bytes, id: &TypeIdentifier<T>) -> Result<T> {
        self.lookup(id)?.read(buf, self)
    }

    /// Append the encoding of `value` to `buf`.
    pub fn write_type<T: 'static>(
        &self,
        buf: &mut BytesMut,
        id: &TypeIdentifier<T>,
        value: &T,
    ) -> Result<()> {
        self.lookup(id)?.write(buf, value, self)
    }

    fn lookup<T: 'static>(&self, id: &TypeIdentifier<T>) -> Result<Arc<dyn TypeCodec<Value = T>>> {
        let erased = self
            .codecs
            .get(id.identifier())
            .ok_or_else(|| ProtocolError::CodecNotRegistered(id.identifier().clone()))?;

        erased
            .downcast_ref::<Arc<dyn TypeCodec<Value = T>>>()
            .cloned()
            .ok_or_else(|| ProtocolError::CodecTypeMismatch(id.identifier().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{StringCodec, VarIntCodec, STRING, VAR_INT};

    #[test]
    fn test_unregistered_codec_fails_both_ways() {
        let codec = DataCodec::for_version(1, EventBus::new(1));
        let mut out = BytesMut::new();
        assert!(matches!(
            codec.write_type(&mut out, &VAR_INT, &5),
            Err(ProtocolError::CodecNotRegistered(_))
        ));

        let mut input = Bytes::from_static(&[0x05]);
        assert!(matches!(
            codec.read_type(&mut input, &VAR_INT),
            Err(ProtocolError::CodecNotRegistered(_))
        ));
    }

    #[test]
    fn test_duplicate_codec_rejected() {
        let codec = DataCodec::for_version(1, EventBus::new(1));
        codec.register(VarIntCodec).unwrap();
        assert!(matches!(
            codec.register(VarIntCodec),
            Err(ProtocolError::DuplicateEntry(_))
        ));
    }

    #[test]
    fn test_mistyped_identifier_is_caught() {
        let codec = DataCodec::for_version(1, EventBus::new(1));
        codec.register(StringCodec).unwrap();

        // Same identifier as the string codec, but claims to produce an i32.
        let forged: TypeIdentifier<i32> = TypeIdentifier::new(STRING.identifier().clone());
        let mut input = Bytes::from_static(&[0x00]);
        assert!(matches!(
            codec.read_type(&mut input, &forged),
            Err(ProtocolError::CodecTypeMismatch(_))
        ));
    }

    #[test]
    fn test_identifier_is_versioned() {
        let codec = DataCodec::for_version(769, EventBus::new(1));
        assert_eq!(codec.identifier().to_string(), "candlemc:codec/769");
    }
}
