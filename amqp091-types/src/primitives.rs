//! Argument encodings shared by the method frames

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::Error;

/// An encoded field table
///
/// The field value system is not part of the frame layer, so a table is kept
/// as its encoded body with the leading `long-uint` size stripped. An empty
/// table encodes as four zero octets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTable(pub Bytes);

impl FieldTable {
    /// Creates an empty table
    pub fn empty() -> Self {
        Self::default()
    }

    /// Encoded entries of the table
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for FieldTable {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

fn ensure(src: &Bytes, len: usize) -> Result<(), Error> {
    match src.remaining() < len {
        true => Err(Error::Truncated),
        false => Ok(()),
    }
}

pub(crate) fn get_u8(src: &mut Bytes) -> Result<u8, Error> {
    ensure(src, 1)?;
    Ok(src.get_u8())
}

pub(crate) fn get_u16(src: &mut Bytes) -> Result<u16, Error> {
    ensure(src, 2)?;
    Ok(src.get_u16())
}

pub(crate) fn get_u32(src: &mut Bytes) -> Result<u32, Error> {
    ensure(src, 4)?;
    Ok(src.get_u32())
}

pub(crate) fn get_u64(src: &mut Bytes) -> Result<u64, Error> {
    ensure(src, 8)?;
    Ok(src.get_u64())
}

pub(crate) fn get_bit(src: &mut Bytes) -> Result<bool, Error> {
    get_u8(src).map(|octet| octet & 0x01 == 0x01)
}

pub(crate) fn get_short_str(src: &mut Bytes) -> Result<String, Error> {
    let len = get_u8(src)? as usize;
    ensure(src, len)?;
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| Error::InvalidUtf8)
}

pub(crate) fn get_long_str(src: &mut Bytes) -> Result<Bytes, Error> {
    let len = get_u32(src)? as usize;
    ensure(src, len)?;
    Ok(src.split_to(len))
}

pub(crate) fn get_table(src: &mut Bytes) -> Result<FieldTable, Error> {
    get_long_str(src).map(FieldTable)
}

pub(crate) fn put_short_str(dst: &mut BytesMut, value: &str) -> Result<(), Error> {
    let len = u8::try_from(value.len()).map_err(|_| Error::ShortStringTooLong(value.len()))?;
    dst.put_u8(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}

pub(crate) fn put_long_str(dst: &mut BytesMut, value: &[u8]) -> Result<(), Error> {
    let len = u32::try_from(value.len()).map_err(|_| Error::PayloadTooLarge(value.len()))?;
    dst.put_u32(len);
    dst.put_slice(value);
    Ok(())
}

pub(crate) fn put_table(dst: &mut BytesMut, table: &FieldTable) -> Result<(), Error> {
    put_long_str(dst, table.as_bytes())
}

pub(crate) fn put_bit(dst: &mut BytesMut, value: bool) {
    dst.put_u8(value as u8);
}
