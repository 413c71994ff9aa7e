//! Deterministic binary encoding of row values.
//!
//! Used for cache keys: two rows yield the same key bytes iff their selected values are
//! equal. Every value is a one-byte tag followed by a fixed or length-prefixed payload.

use crate::error::CodecError;
use crate::types::{Row, Value};
use bigdecimal::BigDecimal;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::DateTime;
use std::str::FromStr;

const TAG_NULL: u8 = 0;
const TAG_BOOLEAN: u8 = 1;
const TAG_INTEGER: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_DECIMAL: u8 = 4;
const TAG_STRING: u8 = 5;
const TAG_DATE: u8 = 6;
const TAG_BINARY: u8 = 7;

fn put_value(buf: &mut BytesMut, value: &Value) {
  match value {
    Value::Null => buf.put_u8(TAG_NULL),
    Value::Boolean(b) => {
      buf.put_u8(TAG_BOOLEAN);
      buf.put_u8(u8::from(*b));
    }
    Value::Integer(i) => {
      buf.put_u8(TAG_INTEGER);
      buf.put_i64(*i);
    }
    Value::Number(n) => {
      buf.put_u8(TAG_NUMBER);
      buf.put_u64(n.to_bits());
    }
    Value::Decimal(d) => {
      // Normalized so 1.0 and 1.00 encode alike.
      let text = d.normalized().to_string();
      buf.put_u8(TAG_DECIMAL);
      buf.put_u32(text.len() as u32);
      buf.put_slice(text.as_bytes());
    }
    Value::String(s) => {
      buf.put_u8(TAG_STRING);
      buf.put_u32(s.len() as u32);
      buf.put_slice(s.as_bytes());
    }
    Value::Date(d) => {
      buf.put_u8(TAG_DATE);
      buf.put_i64(d.timestamp_micros());
    }
    Value::Binary(b) => {
      buf.put_u8(TAG_BINARY);
      buf.put_u32(b.len() as u32);
      buf.put_slice(b);
    }
  }
}

/// Encodes all values of a slice.
pub fn encode_values(values: &[Value]) -> Bytes {
  let mut buf = BytesMut::with_capacity(values.len() * 9);
  for v in values {
    put_value(&mut buf, v);
  }
  buf.freeze()
}

/// Encodes the values at `indexes`, in that order.
pub fn encode_key(row: &Row, indexes: &[usize]) -> Result<Bytes, CodecError> {
  let mut buf = BytesMut::with_capacity(indexes.len() * 9);
  for &index in indexes {
    let value = row.get(index).ok_or(CodecError::KeyIndexOutOfRange {
      index,
      len: row.len(),
    })?;
    put_value(&mut buf, value);
  }
  Ok(buf.freeze())
}

pub fn decode_values(bytes: &[u8]) -> Result<Vec<Value>, CodecError> {
  let total = bytes.len();
  let mut buf = bytes;
  let mut out = Vec::new();
  while buf.has_remaining() {
    let offset = total - buf.remaining();
    let tag = buf.get_u8();
    let value = match tag {
      TAG_NULL => Value::Null,
      TAG_BOOLEAN => {
        need(&buf, 1, offset)?;
        Value::Boolean(buf.get_u8() != 0)
      }
      TAG_INTEGER => {
        need(&buf, 8, offset)?;
        Value::Integer(buf.get_i64())
      }
      TAG_NUMBER => {
        need(&buf, 8, offset)?;
        Value::Number(f64::from_bits(buf.get_u64()))
      }
      TAG_DECIMAL => {
        let text = take_str(&mut buf, offset)?;
        Value::Decimal(
          BigDecimal::from_str(&text).map_err(|_| CodecError::InvalidDecimal(text.clone()))?,
        )
      }
      TAG_STRING => Value::String(take_str(&mut buf, offset)?),
      TAG_DATE => {
        need(&buf, 8, offset)?;
        let micros = buf.get_i64();
        Value::Date(DateTime::from_timestamp_micros(micros).ok_or(CodecError::InvalidDate(micros))?)
      }
      TAG_BINARY => Value::Binary(Bytes::copy_from_slice(take_bytes(&mut buf, offset)?)),
      tag => return Err(CodecError::UnknownTag { tag, offset }),
    };
    out.push(value);
  }
  Ok(out)
}

pub fn decode_row(bytes: &[u8]) -> Result<Row, CodecError> {
  decode_values(bytes).map(Row::new)
}

fn need(buf: &&[u8], n: usize, offset: usize) -> Result<(), CodecError> {
  if buf.remaining() < n {
    Err(CodecError::Truncated(offset))
  } else {
    Ok(())
  }
}

fn take_bytes<'a>(buf: &mut &'a [u8], offset: usize) -> Result<&'a [u8], CodecError> {
  need(buf, 4, offset)?;
  let len = buf.get_u32() as usize;
  need(buf, len, offset)?;
  let rest: &'a [u8] = *buf;
  let (head, tail) = rest.split_at(len);
  *buf = tail;
  Ok(head)
}

fn take_str(buf: &mut &[u8], offset: usize) -> Result<String, CodecError> {
  let raw = take_bytes(buf, offset)?;
  std::str::from_utf8(raw)
    .map(str::to_string)
    .map_err(|_| CodecError::InvalidUtf8(offset))
}
