use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::error::Error;
use std::str::FromStr;
use thiserror::Error;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type};

type BoxError = Box<dyn Error + Sync + Send>;

/// A JSON parameter could not be encoded as the type the server inferred for its placeholder
#[derive(Error, Debug)]
#[error("cannot bind {value} as {type_name}: {reason}")]
pub struct ParamError {
    pub type_name: String,
    pub value: String,
    pub reason: String,
}

/// JSON request parameter bound to a positional placeholder.
///
/// Encoding is chosen from the placeholder type the server reported when the
/// statement was prepared, so `42` binds as int4 for an int4 column and as
/// text for a text column.
#[derive(Debug)]
pub struct JsonParam<'a>(pub &'a Value);

impl JsonParam<'_> {
    fn error(&self, ty: &Type, reason: impl Into<String>) -> BoxError {
        Box::new(ParamError {
            type_name: ty.name().to_string(),
            value: self.0.to_string(),
            reason: reason.into(),
        })
    }

    fn as_text(&self) -> String {
        match self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn as_str(&self, ty: &Type) -> Result<&str, BoxError> {
        self.0
            .as_str()
            .ok_or_else(|| self.error(ty, "expected a string"))
    }

    fn as_bool(&self, ty: &Type) -> Result<bool, BoxError> {
        match self.0 {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "on" | "1" => Ok(true),
                "false" | "f" | "no" | "off" | "0" => Ok(false),
                _ => Err(self.error(ty, "not a boolean")),
            },
            _ => Err(self.error(ty, "not a boolean")),
        }
    }

    fn as_i64(&self, ty: &Type) -> Result<i64, BoxError> {
        match self.0 {
            Value::Number(n) => n.as_i64().ok_or_else(|| self.error(ty, "not an integer")),
            Value::String(s) => s.trim().parse().map_err(|_| self.error(ty, "not an integer")),
            _ => Err(self.error(ty, "not an integer")),
        }
    }

    fn as_f64(&self, ty: &Type) -> Result<f64, BoxError> {
        match self.0 {
            Value::Number(n) => n.as_f64().ok_or_else(|| self.error(ty, "not a number")),
            Value::String(s) => s.trim().parse().map_err(|_| self.error(ty, "not a number")),
            _ => Err(self.error(ty, "not a number")),
        }
    }

    fn as_decimal(&self, ty: &Type) -> Result<Decimal, BoxError> {
        let text = match self.0 {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => return Err(self.error(ty, "not a number")),
        };
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|e| self.error(ty, e.to_string()))
    }

    fn narrow<T: TryFrom<i64>>(&self, ty: &Type) -> Result<T, BoxError> {
        T::try_from(self.as_i64(ty)?).map_err(|_| self.error(ty, "out of range"))
    }
}

impl ToSql for JsonParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.0.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => self.as_bool(ty)?.to_sql(ty, out),
            Type::INT2 => self.narrow::<i16>(ty)?.to_sql(ty, out),
            Type::INT4 => self.narrow::<i32>(ty)?.to_sql(ty, out),
            Type::INT8 => self.as_i64(ty)?.to_sql(ty, out),
            Type::OID => self.narrow::<u32>(ty)?.to_sql(ty, out),
            Type::FLOAT4 => (self.as_f64(ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => self.as_f64(ty)?.to_sql(ty, out),
            Type::NUMERIC => self.as_decimal(ty)?.to_sql(ty, out),
            Type::JSON | Type::JSONB => self.0.to_sql(ty, out),
            Type::UUID => uuid::Uuid::parse_str(self.as_str(ty)?)
                .map_err(|e| self.error(ty, e.to_string()))?
                .to_sql(ty, out),
            Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(self.as_str(ty)?)
                .map_err(|e| self.error(ty, e.to_string()))?
                .with_timezone(&Utc)
                .to_sql(ty, out),
            Type::TIMESTAMP => parse_naive_datetime(self.as_str(ty)?)
                .ok_or_else(|| self.error(ty, "expected YYYY-MM-DD HH:MM:SS"))?
                .to_sql(ty, out),
            Type::DATE => NaiveDate::parse_from_str(self.as_str(ty)?, "%Y-%m-%d")
                .map_err(|e| self.error(ty, e.to_string()))?
                .to_sql(ty, out),
            Type::TIME => NaiveTime::from_str(self.as_str(ty)?)
                .map_err(|e| self.error(ty, e.to_string()))?
                .to_sql(ty, out),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                self.as_text().to_sql(ty, out)
            }
            _ => match ty.kind() {
                Kind::Domain(base) => self.to_sql(base, out),
                // Enum input and citext share the text wire format
                Kind::Enum(_) => {
                    out.extend_from_slice(self.as_text().as_bytes());
                    Ok(IsNull::No)
                }
                _ if ty.name() == "citext" => {
                    out.extend_from_slice(self.as_text().as_bytes());
                    Ok(IsNull::No)
                }
                _ => Err(self.error(
                    ty,
                    format!("unsupported parameter type; cast the placeholder, e.g. $1::text::{}", ty.name()),
                )),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn to_sql_checked(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        self.to_sql(ty, out)
    }
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

/// Borrow every parameter as a driver-ready trait object
pub fn bind_params(params: &[Value]) -> Vec<JsonParam<'_>> {
    params.iter().map(JsonParam).collect()
}
