use crate::{ColdQueryError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_protocol::types as wire;
use serde_json::{Map, Number, Value};
use std::error::Error;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Kind, Type};

type BoxError = Box<dyn Error + Sync + Send>;

/// Converts PostgreSQL result values into JSON
pub struct ValueConverter;

impl ValueConverter {
    /// Convert a row into an ordered column-name to value mapping
    pub fn row_to_json(row: &Row) -> Result<Map<String, Value>> {
        let names: Vec<&str> = row.columns().iter().map(|c| c.name()).collect();
        Self::row_to_json_as(row, &names)
    }

    /// Convert a row, keying its values by position with `names`
    pub fn row_to_json_as(row: &Row, names: &[&str]) -> Result<Map<String, Value>> {
        let mut map = Map::with_capacity(row.len());
        for (idx, (column, name)) in row.columns().iter().zip(names).enumerate() {
            let value = Self::column_value(row, idx, column.type_()).map_err(|e| {
                ColdQueryError::NotSupported(format!(
                    "cannot decode column \"{}\" of type {}: {}",
                    name,
                    column.type_().name(),
                    e
                ))
            })?;
            map.insert(name.to_string(), value);
        }
        Ok(map)
    }

    /// Whether values of `ty` have a binary decoder; others are fetched in text form
    pub fn is_supported(ty: &Type) -> bool {
        match *ty {
            Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::UNKNOWN
            | Type::JSON
            | Type::JSONB
            | Type::UUID
            | Type::TIMESTAMPTZ
            | Type::TIMESTAMP
            | Type::DATE
            | Type::TIME
            | Type::BYTEA
            | Type::INET
            | Type::CIDR
            | Type::TEXT_ARRAY
            | Type::VARCHAR_ARRAY
            | Type::NAME_ARRAY
            | Type::INT4_ARRAY
            | Type::INT8_ARRAY
            | Type::BOOL_ARRAY
            | Type::FLOAT8_ARRAY
            | Type::NUMERIC_ARRAY => true,
            _ => LabelText::accepts(ty),
        }
    }

    /// Convert a value in its text form, typed by the column's declared type when known
    pub fn text_value(text: Option<&str>, ty: Option<&Type>) -> Value {
        let Some(text) = text else {
            return Value::Null;
        };
        let Some(ty) = ty else {
            return Value::String(text.to_string());
        };

        let parsed = match *ty {
            Type::BOOL => match text {
                "t" => Some(Value::Bool(true)),
                "f" => Some(Value::Bool(false)),
                _ => None,
            },
            Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => text.parse::<i64>().ok().map(Value::from),
            Type::FLOAT4 | Type::FLOAT8 => text.parse::<f64>().ok().map(float_value),
            Type::JSON | Type::JSONB => serde_json::from_str(text).ok(),
            _ => None,
        };
        parsed.unwrap_or_else(|| Value::String(text.to_string()))
    }

    fn column_value(row: &Row, idx: usize, ty: &Type) -> std::result::Result<Value, tokio_postgres::Error> {
        let value = match *ty {
            Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
            Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
            Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
            Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
            Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(Value::from),
            Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|f| float_value(f as f64)),
            Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(float_value),
            // Kept as a string to preserve precision
            Type::NUMERIC => row
                .try_get::<_, Option<NumericText>>(idx)?
                .map(|n| Value::String(n.0)),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                row.try_get::<_, Option<String>>(idx)?.map(Value::String)
            }
            Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?,
            Type::UUID => row
                .try_get::<_, Option<uuid::Uuid>>(idx)?
                .map(|u| Value::String(u.to_string())),
            Type::TIMESTAMPTZ => row
                .try_get::<_, Option<DateTime<Utc>>>(idx)?
                .map(|t| Value::String(t.to_rfc3339())),
            Type::TIMESTAMP => row
                .try_get::<_, Option<NaiveDateTime>>(idx)?
                .map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            Type::DATE => row
                .try_get::<_, Option<NaiveDate>>(idx)?
                .map(|d| Value::String(d.to_string())),
            Type::TIME => row
                .try_get::<_, Option<NaiveTime>>(idx)?
                .map(|t| Value::String(t.to_string())),
            Type::BYTEA => row
                .try_get::<_, Option<Vec<u8>>>(idx)?
                .map(|b| Value::String(format!("\\x{}", hex::encode(b)))),
            Type::INET | Type::CIDR => row
                .try_get::<_, Option<InetText>>(idx)?
                .map(|inet| Value::String(inet.0)),
            Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY => row
                .try_get::<_, Option<Vec<Option<String>>>>(idx)?
                .map(|items| Value::Array(items.into_iter().map(|s| s.map_or(Value::Null, Value::String)).collect())),
            Type::INT4_ARRAY => row
                .try_get::<_, Option<Vec<Option<i32>>>>(idx)?
                .map(|items| Value::Array(items.into_iter().map(Value::from).collect())),
            Type::INT8_ARRAY => row
                .try_get::<_, Option<Vec<Option<i64>>>>(idx)?
                .map(|items| Value::Array(items.into_iter().map(Value::from).collect())),
            Type::BOOL_ARRAY => row
                .try_get::<_, Option<Vec<Option<bool>>>>(idx)?
                .map(|items| Value::Array(items.into_iter().map(Value::from).collect())),
            Type::FLOAT8_ARRAY => row
                .try_get::<_, Option<Vec<Option<f64>>>>(idx)?
                .map(|items| Value::Array(items.into_iter().map(|f| f.map_or(Value::Null, float_value)).collect())),
            Type::NUMERIC_ARRAY => row
                .try_get::<_, Option<Vec<Option<NumericText>>>>(idx)?
                .map(|items| Value::Array(items.into_iter().map(|n| n.map_or(Value::Null, |n| Value::String(n.0))).collect())),
            _ if LabelText::accepts(ty) => row.try_get::<_, Option<LabelText>>(idx)?.map(|label| Value::String(label.0)),
            _ => row.try_get::<_, Option<RawValue>>(idx)?.map(|raw| raw.0),
        };

        Ok(value.unwrap_or(Value::Null))
    }
}

/// NaN and infinities have no JSON number form
fn float_value(f: f64) -> Value {
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(f.to_string()))
}

/// Exact decimal text of a numeric value, including NaN and the infinities
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        let header = |at: usize| -> std::result::Result<u16, BoxError> {
            raw.get(at..at + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or_else(|| "numeric value is truncated".into())
        };

        let ndigits = header(0)? as usize;
        let weight = header(2)? as i16 as i32;
        let sign = header(4)?;
        let dscale = header(6)? as usize;
        let digits = (0..ndigits)
            .map(|i| header(8 + 2 * i))
            .collect::<std::result::Result<Vec<u16>, BoxError>>()?;

        let text = match sign {
            0x0000 => format_numeric(&digits, weight, dscale, false),
            0x4000 => format_numeric(&digits, weight, dscale, true),
            0xC000 => "NaN".to_string(),
            0xD000 => "Infinity".to_string(),
            0xF000 => "-Infinity".to_string(),
            other => return Err(format!("invalid numeric sign {:#06x}", other).into()),
        };
        Ok(NumericText(text))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Render base-10000 digit groups; `weight` is the power of the first group
fn format_numeric(digits: &[u16], weight: i32, dscale: usize, negative: bool) -> String {
    let group = |position: i32| -> u16 {
        usize::try_from(position)
            .ok()
            .and_then(|i| digits.get(i))
            .copied()
            .unwrap_or(0)
    };

    let mut text = String::new();
    if negative {
        text.push('-');
    }

    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&group(0).to_string());
        for position in 1..=weight {
            text.push_str(&format!("{:04}", group(position)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut position = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(position)));
            position += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    text
}

/// inet and cidr in PostgreSQL's own text form
struct InetText(String);

impl<'a> FromSql<'a> for InetText {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        let inet = wire::inet_from_sql(raw)?;
        let host_bits = if inet.addr().is_ipv4() { 32 } else { 128 };

        let text = if *ty == Type::CIDR || inet.netmask() != host_bits {
            format!("{}/{}", inet.addr(), inet.netmask())
        } else {
            inet.addr().to_string()
        };
        Ok(InetText(text))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::INET | Type::CIDR)
    }
}

/// Types whose binary form is their text: enum labels and citext
struct LabelText(String);

impl<'a> FromSql<'a> for LabelText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(LabelText(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_)) || ty.name() == "citext"
    }
}

/// Last resort for binary values without a decoder: hex-encoded bytes
struct RawValue(Value);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(RawValue(Value::String(format!("\\x{}", hex::encode(raw)))))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}
