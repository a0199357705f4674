//! Conversions between [`Value`] and Postgres wire types.
//!
//! Bound values are encoded according to the parameter type the server inferred, so
//! the text `"42"` binds into an `int4` column and `1` binds into `text`.

use crate::bind::BoundValue;
use crate::error::{DbError, DbResult};
use crate::value::Value;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

impl ToSql for BoundValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match &self.value {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => bool_to_sql(*b, ty, out),
            Value::Int(i) => int_to_sql(*i, ty, out),
            Value::Float(f) => float_to_sql(*f, ty, out),
            Value::Text(s) => text_to_sql(s, ty, out),
            Value::Blob(b) => blob_to_sql(b, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn bool_to_sql(b: bool, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => b.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 => int_to_sql(i64::from(b), ty, out),
        _ => text_to_sql(if b { "true" } else { "false" }, ty, out),
    }
}

fn int_to_sql(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        _ => text_to_sql(&i.to_string(), ty, out),
    }
}

fn float_to_sql(f: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::FLOAT8 => f.to_sql(ty, out),
        _ => text_to_sql(&f.to_string(), ty, out),
    }
}

fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let trimmed = s.trim();
    match *ty {
        Type::INT2 => trimmed.parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => trimmed.parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => trimmed.parse::<i64>()?.to_sql(ty, out),
        Type::OID => trimmed.parse::<u32>()?.to_sql(ty, out),
        Type::FLOAT4 => trimmed.parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => trimmed.parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => Numeric::parse(trimmed)?.to_sql(ty, out),
        Type::BOOL => parse_bool(trimmed)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(trimmed)?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(trimmed)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamptz(trimmed)?.to_sql(ty, out),
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        _ if <&str as ToSql>::accepts(ty) => s.to_sql(ty, out),
        _ if matches!(ty.kind(), Kind::Enum(_)) => {
            out.extend_from_slice(s.as_bytes());
            Ok(IsNull::No)
        }
        _ => Err(format!("cannot bind text to a parameter of type {ty}").into()),
    }
}

fn blob_to_sql(b: &[u8], ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BYTEA => b.to_sql(ty, out),
        _ => text_to_sql(std::str::from_utf8(b)?, ty, out),
    }
}

fn parse_bool(s: &str) -> Result<bool, BoxError> {
    match s.to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "y" | "yes" | "on" => Ok(true),
        "f" | "false" | "0" | "n" | "no" | "off" | "" => Ok(false),
        other => Err(format!("invalid boolean value: {other}").into()),
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ts);
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
    Ok(date.and_hms_opt(0, 0, 0).ok_or("invalid date")?)
}

fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, BoxError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(ts.with_timezone(&Utc));
    }
    Ok(parse_timestamp(s)?.and_utc())
}

/// A NUMERIC parameter or column value.
///
/// Finite values go through [`Decimal`]. Postgres also stores `NaN` and the
/// infinities, which have no `Decimal` form and travel as a bare header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Numeric {
    Finite(Decimal),
    NaN,
    Infinity,
    NegInfinity,
}

impl Numeric {
    /// Parse decimal text: plain (`-12.50`, `.5`), scientific (`1.5E-3`) or special
    /// (`NaN`, `Infinity`, `-Infinity`).
    pub(crate) fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "nan" => return Ok(Self::NaN),
            "infinity" | "+infinity" | "inf" | "+inf" => return Ok(Self::Infinity),
            "-infinity" | "-inf" => return Ok(Self::NegInfinity),
            _ => {}
        }
        Decimal::from_str_exact(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map(Self::Finite)
            .map_err(|e| format!("'{s}' is not a representable NUMERIC value ({e})"))
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(d) => write!(f, "{d}"),
            Self::NaN => f.write_str("NaN"),
            Self::Infinity => f.write_str("Infinity"),
            Self::NegInfinity => f.write_str("-Infinity"),
        }
    }
}

impl ToSql for Numeric {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let sign = match self {
            Self::Finite(d) => return d.to_sql(ty, out),
            Self::NaN => NUMERIC_NAN,
            Self::Infinity => NUMERIC_PINF,
            Self::NegInfinity => NUMERIC_NINF,
        };
        // ndigits, weight, sign, dscale
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(sign);
        out.put_u16(0);
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        if raw.len() >= 8 {
            match u16::from_be_bytes([raw[4], raw[5]]) {
                NUMERIC_NAN => return Ok(Self::NaN),
                NUMERIC_PINF => return Ok(Self::Infinity),
                NUMERIC_NINF => return Ok(Self::NegInfinity),
                _ => {}
            }
        }
        Decimal::from_sql(ty, raw).map(Self::Finite)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// A bound value paired with the parameter type the server inferred for it.
#[derive(Debug)]
pub(crate) enum Arg<'a> {
    Bound(&'a BoundValue),
    Numeric(Numeric),
}

impl ToSql for Arg<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Arg::Bound(v) => v.to_sql(ty, out),
            Arg::Numeric(n) => n.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Resolve the value for `$index` against its parameter type.
///
/// NUMERIC text is parsed here so a value outside the `Decimal` range fails as a
/// [`DbError::Parameter`] naming the parameter, rather than as an opaque driver
/// serialization error.
pub(crate) fn resolve<'a>(value: &'a BoundValue, ty: &Type, index: usize) -> DbResult<Arg<'a>> {
    if *ty != Type::NUMERIC {
        return Ok(Arg::Bound(value));
    }
    match &value.value {
        Value::Int(i) => Ok(Arg::Numeric(Numeric::Finite(Decimal::from(*i)))),
        Value::Text(s) => Numeric::parse(s.trim())
            .map(Arg::Numeric)
            .map_err(|e| DbError::Parameter(format!("${index}: {e}"))),
        _ => Ok(Arg::Bound(value)),
    }
}

/// Enum labels arrive as raw UTF-8.
struct EnumLabel(String);

impl<'a> FromSql<'a> for EnumLabel {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Self(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

/// Decode every column of a row into [`Value`]s.
pub(crate) fn decode_row(row: &Row) -> DbResult<Vec<Value>> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        macro_rules! get {
            ($ty:ty, $map:expr) => {
                row.try_get::<_, Option<$ty>>(idx).map(|v| v.map($map))
            };
        }

        let ty = column.type_();
        let decoded = match *ty {
            Type::BOOL => get!(bool, Value::Bool),
            Type::INT2 => get!(i16, |v| Value::Int(i64::from(v))),
            Type::INT4 => get!(i32, |v| Value::Int(i64::from(v))),
            Type::INT8 => get!(i64, Value::Int),
            Type::OID => get!(u32, |v| Value::Int(i64::from(v))),
            Type::FLOAT4 => get!(f32, |v| Value::Float(f64::from(v))),
            Type::FLOAT8 => get!(f64, Value::Float),
            Type::NUMERIC => get!(Numeric, |v| Value::Text(v.to_string())),
            Type::BYTEA => get!(Vec<u8>, Value::Blob),
            Type::JSON | Type::JSONB => get!(serde_json::Value, |v| Value::Text(v.to_string())),
            Type::UUID => get!(uuid::Uuid, |v| Value::Text(v.to_string())),
            Type::DATE => get!(NaiveDate, |v| Value::Text(v.format("%Y-%m-%d").to_string())),
            Type::TIMESTAMP => get!(NaiveDateTime, |v| {
                Value::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }),
            Type::TIMESTAMPTZ => get!(DateTime<Utc>, |v| Value::Text(v.to_rfc3339())),
            _ if <String as FromSql>::accepts(ty) => get!(String, Value::Text),
            _ if <EnumLabel as FromSql>::accepts(ty) => get!(EnumLabel, |v| Value::Text(v.0)),
            _ => {
                return Err(DbError::decode(
                    column.name(),
                    format!("unsupported column type {ty}"),
                ));
            }
        };
        let value = decoded.map_err(|e| DbError::decode(column.name(), e.to_string()))?;
        values.push(value.unwrap_or(Value::Null));
    }
    Ok(values)
}
