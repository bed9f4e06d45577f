// ABOUTME: Conversions between tokio-postgres values and the JSON row model
// ABOUTME: Decodes result columns by type name and binds string ids to typed parameters

use anyhow::{Context, Result};
use bytes::BytesMut;
use serde_json::{Number, Value};
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::client::Row;

/// Convert a result row into a JSON map keyed by column name.
///
/// Text-like and uuid columns become strings, numeric columns numbers and
/// json/jsonb their parsed value. NULL is `null`. Columns of any other type
/// decode as `null` with a warning.
pub fn row_to_map(row: &tokio_postgres::Row) -> Result<Row> {
    let mut map = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let value = decode_column(row, idx, column.type_())
            .with_context(|| format!("Failed to decode column '{}'", name))?;
        map.insert(name.to_string(), value);
    }
    Ok(map)
}

fn decode_column(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<Value> {
    let value = match ty.name() {
        "text" | "varchar" | "bpchar" | "name" => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::String)
        }
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|id| Value::String(id.to_string())),
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .and_then(|f| Number::from_f64(f as f64))
            .map(Value::Number),
        "float8" => row
            .try_get::<_, Option<f64>>(idx)?
            .and_then(Number::from_f64)
            .map(Value::Number),
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        "json" | "jsonb" => row.try_get::<_, Option<Value>>(idx)?,
        other => {
            tracing::warn!("Unsupported column type '{}', decoding as null", other);
            None
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

/// A string value bound to whatever parameter type the server inferred.
///
/// Entity ids travel as strings, but key columns are often uuid or integer
/// typed. Those are parsed before encoding; text-like types are sent as is.
#[derive(Debug)]
pub struct TextParam<'a>(pub &'a str);

impl ToSql for TextParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match ty.name() {
            "uuid" => uuid::Uuid::parse_str(self.0)?.to_sql(ty, out),
            "int2" => self.0.parse::<i16>()?.to_sql(ty, out),
            "int4" => self.0.parse::<i32>()?.to_sql(ty, out),
            "int8" => self.0.parse::<i64>()?.to_sql(ty, out),
            _ => self.0.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.name(), "uuid" | "int2" | "int4" | "int8") || <&str as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_param_accepts_key_types() {
        for ty in [
            Type::TEXT,
            Type::VARCHAR,
            Type::UUID,
            Type::INT4,
            Type::INT8,
        ] {
            assert!(<TextParam<'_> as ToSql>::accepts(&ty), "{}", ty);
        }
        assert!(!<TextParam<'_> as ToSql>::accepts(&Type::BOOL));
    }

    #[test]
    fn test_text_param_encodes_uuid_as_binary() {
        let mut out = BytesMut::new();
        TextParam("67e55044-10b1-426f-9247-bb680e5fe0c8")
            .to_sql(&Type::UUID, &mut out)
            .unwrap();
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn test_text_param_rejects_invalid_integer() {
        let mut out = BytesMut::new();
        assert!(TextParam("abc").to_sql(&Type::INT4, &mut out).is_err());

        let mut out = BytesMut::new();
        TextParam("42").to_sql(&Type::INT8, &mut out).unwrap();
        assert_eq!(&out[..], &42i64.to_be_bytes());
    }

    #[test]
    fn test_text_param_passes_text_through() {
        let mut out = BytesMut::new();
        TextParam("foo").to_sql(&Type::TEXT, &mut out).unwrap();
        assert_eq!(&out[..], b"foo");
    }
}
