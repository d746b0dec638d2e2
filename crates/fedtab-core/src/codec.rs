//! Byte codec for values, rows, and filters.
//!
//! The cache stores materialized rows and serialized filters as tagged
//! bytes; subsumption compares decoded values for exact equality, so the
//! encoding must round-trip every value bit-for-bit. The same value
//! encoding doubles as a hashable join/distinct key.

use fedtab_types::Value;

use crate::error::Error;
use crate::model::Filter;
use crate::model::ConceptId;

/// Type tag for encoded values.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueTag {
    Null = 0,
    Bool = 1,
    Int32 = 2,
    Int64 = 3,
    Float64 = 4,
    String = 5,
    Bytes = 6,
    Timestamp = 7,
}

impl TryFrom<u8> for ValueTag {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ValueTag::Null),
            1 => Ok(ValueTag::Bool),
            2 => Ok(ValueTag::Int32),
            3 => Ok(ValueTag::Int64),
            4 => Ok(ValueTag::Float64),
            5 => Ok(ValueTag::String),
            6 => Ok(ValueTag::Bytes),
            7 => Ok(ValueTag::Timestamp),
            _ => Err(Error::Codec(format!("unknown value tag: {value}"))),
        }
    }
}

/// Filter kind tags in the serialized filter stream.
const FILTER_KIND_VALUES: u8 = 0;
const FILTER_KIND_INTERVAL: u8 = 1;

/// Append one encoded value: tag byte plus little-endian payload.
pub fn encode_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.push(ValueTag::Null as u8),
        Value::Bool(b) => {
            buf.push(ValueTag::Bool as u8);
            buf.push(u8::from(*b));
        }
        Value::Int32(i) => {
            buf.push(ValueTag::Int32 as u8);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Int64(i) => {
            buf.push(ValueTag::Int64 as u8);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float64(f) => {
            buf.push(ValueTag::Float64 as u8);
            buf.extend_from_slice(&f.to_le_bytes());
        }
        Value::String(s) => {
            buf.push(ValueTag::String as u8);
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            buf.push(ValueTag::Bytes as u8);
            buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
            buf.extend_from_slice(b);
        }
        Value::Timestamp(t) => {
            buf.push(ValueTag::Timestamp as u8);
            buf.extend_from_slice(&t.to_le_bytes());
        }
    }
}

/// Decode one value; returns the value and the bytes consumed.
pub fn decode_value(data: &[u8]) -> Result<(Value, usize), Error> {
    let tag = *data
        .first()
        .ok_or_else(|| Error::Codec("empty data for value".into()))?;
    let tag = ValueTag::try_from(tag)?;
    let body = &data[1..];

    match tag {
        ValueTag::Null => Ok((Value::Null, 1)),
        ValueTag::Bool => {
            let b = *body
                .first()
                .ok_or_else(|| Error::Codec("truncated bool".into()))?;
            Ok((Value::Bool(b != 0), 2))
        }
        ValueTag::Int32 => {
            let bytes = take_array::<4>(body, "int32")?;
            Ok((Value::Int32(i32::from_le_bytes(bytes)), 5))
        }
        ValueTag::Int64 => {
            let bytes = take_array::<8>(body, "int64")?;
            Ok((Value::Int64(i64::from_le_bytes(bytes)), 9))
        }
        ValueTag::Float64 => {
            let bytes = take_array::<8>(body, "float64")?;
            Ok((Value::Float64(f64::from_le_bytes(bytes)), 9))
        }
        ValueTag::String => {
            let len = u32::from_le_bytes(take_array::<4>(body, "string length")?) as usize;
            let bytes = take(&body[4..], len, "string body")?;
            let s = String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::Codec("invalid UTF-8 in string value".into()))?;
            Ok((Value::String(s), 1 + 4 + len))
        }
        ValueTag::Bytes => {
            let len = u32::from_le_bytes(take_array::<4>(body, "bytes length")?) as usize;
            let bytes = take(&body[4..], len, "bytes body")?;
            Ok((Value::Bytes(bytes.to_vec()), 1 + 4 + len))
        }
        ValueTag::Timestamp => {
            let bytes = take_array::<8>(body, "timestamp")?;
            Ok((Value::Timestamp(i64::from_le_bytes(bytes)), 9))
        }
    }
}

fn take<'a>(data: &'a [u8], len: usize, what: &str) -> Result<&'a [u8], Error> {
    data.get(..len)
        .ok_or_else(|| Error::Codec(format!("data too short for {what}")))
}

fn take_array<const N: usize>(data: &[u8], what: &str) -> Result<[u8; N], Error> {
    let slice = take(data, N, what)?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

/// Canonical byte key for a value, used for hash-join probes and
/// distinct sets. Integers are widened to 64 bits so `Int32(1)` and
/// `Int64(1)` collide the same way [`fedtab_types::values_equal`]
/// treats them as equal.
pub fn value_key(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    match value {
        Value::Int32(i) => encode_value(&mut buf, &Value::Int64(i64::from(*i))),
        other => encode_value(&mut buf, other),
    }
    buf
}

/// Encode a fixed-arity row: column count followed by each value.
pub fn encode_row(row: &[Value]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(row.len() as u16).to_le_bytes());
    for value in row {
        encode_value(&mut buf, value);
    }
    buf
}

/// Decode a row produced by [`encode_row`].
pub fn decode_row(data: &[u8]) -> Result<Vec<Value>, Error> {
    let count = u16::from_le_bytes(take_array::<2>(data, "row column count")?) as usize;
    let mut cursor = 2;
    let mut row = Vec::with_capacity(count);
    for _ in 0..count {
        let (value, read) = decode_value(&data[cursor..])?;
        cursor += read;
        row.push(value);
    }
    Ok(row)
}

/// Serialize filters ordered by ascending concept id.
///
/// Each filter self-describes as values or interval so a reader can
/// reconstruct it without the data model at hand.
pub fn encode_filters(filters: &[Filter]) -> Vec<u8> {
    let mut ordered: Vec<&Filter> = filters.iter().collect();
    ordered.sort_by_key(|f| f.concept());

    let mut buf = Vec::new();
    buf.extend_from_slice(&(ordered.len() as u16).to_le_bytes());
    for filter in ordered {
        buf.extend_from_slice(&filter.concept().0.to_le_bytes());
        match filter {
            Filter::Values { values, .. } => {
                buf.push(FILTER_KIND_VALUES);
                buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
                for value in values {
                    encode_value(&mut buf, value);
                }
            }
            Filter::Interval { lower, upper, .. } => {
                buf.push(FILTER_KIND_INTERVAL);
                let flags = u8::from(lower.is_some()) | (u8::from(upper.is_some()) << 1);
                buf.push(flags);
                if let Some(lo) = lower {
                    encode_value(&mut buf, lo);
                }
                if let Some(hi) = upper {
                    encode_value(&mut buf, hi);
                }
            }
        }
    }
    buf
}

/// Decode filters produced by [`encode_filters`].
pub fn decode_filters(data: &[u8]) -> Result<Vec<Filter>, Error> {
    let count = u16::from_le_bytes(take_array::<2>(data, "filter count")?) as usize;
    let mut cursor = 2;
    let mut filters = Vec::with_capacity(count);

    for _ in 0..count {
        let concept = ConceptId(u32::from_le_bytes(take_array::<4>(
            &data[cursor..],
            "filter concept",
        )?));
        cursor += 4;

        let kind = *data
            .get(cursor)
            .ok_or_else(|| Error::Codec("truncated filter kind".into()))?;
        cursor += 1;

        match kind {
            FILTER_KIND_VALUES => {
                let len = u32::from_le_bytes(take_array::<4>(
                    &data[cursor..],
                    "filter value count",
                )?) as usize;
                cursor += 4;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    let (value, read) = decode_value(&data[cursor..])?;
                    cursor += read;
                    values.push(value);
                }
                filters.push(Filter::values(concept, values));
            }
            FILTER_KIND_INTERVAL => {
                let flags = *data
                    .get(cursor)
                    .ok_or_else(|| Error::Codec("truncated interval flags".into()))?;
                cursor += 1;
                let lower = if flags & 1 != 0 {
                    let (value, read) = decode_value(&data[cursor..])?;
                    cursor += read;
                    Some(value)
                } else {
                    None
                };
                let upper = if flags & 2 != 0 {
                    let (value, read) = decode_value(&data[cursor..])?;
                    cursor += read;
                    Some(value)
                } else {
                    None
                };
                filters.push(Filter::interval(concept, lower, upper));
            }
            other => return Err(Error::Codec(format!("unknown filter kind: {other}"))),
        }
    }

    Ok(filters)
}
