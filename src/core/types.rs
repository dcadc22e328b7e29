//! Primitive wire types.
//!
//! | Type | Encoding |
//! |---|---|
//! | VarInt | 7 data bits per byte, least significant group first, high bit = more bytes, at most 5 bytes |
//! | String | VarInt byte length, then that many UTF-8 bytes |
//! | UnsignedShort | 2 bytes big-endian |
//! | Long | 8 bytes big-endian two's complement |
//! | UUID | most significant 8 bytes, then least significant 8 bytes, both big-endian |

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::core::codec::{DataCodec, TypeCodec, TypeIdentifier};
use crate::error::{constants, ProtocolError, Result};

/// Segment bits mask (lower 7 bits).
const SEGMENT_BITS: u8 = 0x7F;

/// Continue bit (high bit).
const CONTINUE_BIT: u8 = 0x80;

/// Longest legal VarInt encoding.
pub const MAX_VARINT_LEN: usize = 5;

pub const VAR_INT: TypeIdentifier<i32> = TypeIdentifier::from_static("minecraft", "var_int");
pub const STRING: TypeIdentifier<String> = TypeIdentifier::from_static("minecraft", "string");
pub const UNSIGNED_SHORT: TypeIdentifier<u16> =
    TypeIdentifier::from_static("minecraft", "unsigned_short");
pub const LONG: TypeIdentifier<i64> = TypeIdentifier::from_static("minecraft", "long");
pub const UUID: TypeIdentifier<Uuid> = TypeIdentifier::from_static("minecraft", "uuid");

/// Read a `VarInt` from the front of `buf`.
///
/// # Errors
///
/// - [`ProtocolError::UnexpectedEof`] if `buf` ends before the terminating byte
/// - [`ProtocolError::VarIntTooLong`] if five bytes all carry the continue bit
pub fn read_varint(buf: &mut impl Buf) -> Result<i32> {
    let mut value: i32 = 0;

    for position in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(ProtocolError::UnexpectedEof(constants::EOF_VARINT));
        }
        let byte = buf.get_u8();
        value |= i32::from(byte & SEGMENT_BITS) << (7 * position);

        if byte & CONTINUE_BIT == 0 {
            return Ok(value);
        }
    }

    Err(ProtocolError::VarIntTooLong)
}

/// Append a `VarInt` to `buf`, returning the number of bytes written.
#[allow(clippy::cast_sign_loss)]
pub fn write_varint(buf: &mut impl BufMut, value: i32) -> usize {
    let mut value = value as u32;
    let mut written = 0;

    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (value & u32::from(SEGMENT_BITS)) as u8;
        value >>= 7;

        if value != 0 {
            byte |= CONTINUE_BIT;
        }

        buf.put_u8(byte);
        written += 1;

        if value == 0 {
            return written;
        }
    }
}

/// Number of bytes [`write_varint`] emits for `value`.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn varint_len(value: i32) -> usize {
    let value = value as u32;
    if value == 0 {
        return 1;
    }
    let bits_needed = 32 - value.leading_zeros();
    (bits_needed as usize).div_ceil(7)
}

fn ensure_remaining(buf: &Bytes, needed: usize, what: &'static str) -> Result<()> {
    if buf.remaining() < needed {
        Err(ProtocolError::UnexpectedEof(what))
    } else {
        Ok(())
    }
}

/// `minecraft:var_int`
#[derive(Debug, Clone, Copy, Default)]
pub struct VarIntCodec;

impl TypeCodec for VarIntCodec {
    type Value = i32;

    fn identifier(&self) -> TypeIdentifier<i32> {
        VAR_INT
    }

    fn read(&self, buf: &mut Bytes, _codec: &DataCodec) -> Result<i32> {
        read_varint(buf)
    }

    fn write(&self, buf: &mut BytesMut, value: &i32, _codec: &DataCodec) -> Result<()> {
        write_varint(buf, *value);
        Ok(())
    }
}

/// `minecraft:string`. The length prefix goes through the catalog's VarInt codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl TypeCodec for StringCodec {
    type Value = String;

    fn identifier(&self) -> TypeIdentifier<String> {
        STRING
    }

    fn read(&self, buf: &mut Bytes, codec: &DataCodec) -> Result<String> {
        let len = codec.read_type(buf, &VAR_INT)?;
        let len = usize::try_from(len).map_err(|_| ProtocolError::NegativeLength(len))?;
        ensure_remaining(buf, len, constants::EOF_STRING)?;

        let bytes = buf.split_to(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn write(&self, buf: &mut BytesMut, value: &String, codec: &DataCodec) -> Result<()> {
        let bytes = value.as_bytes();
        codec.write_type(buf, &VAR_INT, &(bytes.len() as i32))?;
        buf.put_slice(bytes);
        Ok(())
    }
}

/// `minecraft:unsigned_short`
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsignedShortCodec;

impl TypeCodec for UnsignedShortCodec {
    type Value = u16;

    fn identifier(&self) -> TypeIdentifier<u16> {
        UNSIGNED_SHORT
    }

    fn read(&self, buf: &mut Bytes, _codec: &DataCodec) -> Result<u16> {
        ensure_remaining(buf, 2, constants::EOF_UNSIGNED_SHORT)?;
        Ok(buf.get_u16())
    }

    fn write(&self, buf: &mut BytesMut, value: &u16, _codec: &DataCodec) -> Result<()> {
        buf.put_u16(*value);
        Ok(())
    }
}

/// `minecraft:long`
#[derive(Debug, Clone, Copy, Default)]
pub struct LongCodec;

impl TypeCodec for LongCodec {
    type Value = i64;

    fn identifier(&self) -> TypeIdentifier<i64> {
        LONG
    }

    fn read(&self, buf: &mut Bytes, _codec: &DataCodec) -> Result<i64> {
        ensure_remaining(buf, 8, constants::EOF_LONG)?;
        Ok(buf.get_i64())
    }

    fn write(&self, buf: &mut BytesMut, value: &i64, _codec: &DataCodec) -> Result<()> {
        buf.put_i64(*value);
        Ok(())
    }
}

/// `minecraft:uuid`
///
/// Rejects input whose two halves are bit-for-bit identical; that pattern comes
/// from malformed or hostile clients rather than real UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidCodec;

impl TypeCodec for UuidCodec {
    type Value = Uuid;

    fn identifier(&self) -> TypeIdentifier<Uuid> {
        UUID
    }

    fn read(&self, buf: &mut Bytes, _codec: &DataCodec) -> Result<Uuid> {
        ensure_remaining(buf, 16, constants::EOF_UUID)?;
        let most = buf.get_u64();
        let least = buf.get_u64();

        if most == least {
            return Err(ProtocolError::IdenticalUuidHalves);
        }
        Ok(Uuid::from_u128((u128::from(most) << 64) | u128::from(least)))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write(&self, buf: &mut BytesMut, value: &Uuid, _codec: &DataCodec) -> Result<()> {
        let bits = value.as_u128();
        buf.put_u64((bits >> 64) as u64);
        buf.put_u64(bits as u64);
        Ok(())
    }
}
