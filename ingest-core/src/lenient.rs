//! Forgiving field decoders for provider payloads.
//!
//! Every decoder here maps "missing", `null` and "wrong JSON type" to `None`
//! instead of failing, so one odd field never drops a whole record.
//! Use together with `#[serde(default)]` so absent keys also land on `None`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::model::WeatherCondition;

pub(crate) fn number<'de, D>(de: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.as_ref().and_then(Value::as_f64))
}

pub(crate) fn text<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Integers may arrive as JSON numbers or as numeric strings.
pub(crate) fn integer<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.as_ref().and_then(as_integer))
}

pub(crate) fn condition<'de, D>(de: D) -> Result<Option<WeatherCondition>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(match value {
        Some(obj @ Value::Object(_)) => serde_json::from_value(obj).ok(),
        _ => None,
    })
}

/// `null` becomes `T::default()`.
pub(crate) fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_accepts_numbers_and_numeric_strings() {
        assert_eq!(as_integer(&json!(1700000000)), Some(1_700_000_000));
        assert_eq!(as_integer(&json!(1700000000.9)), Some(1_700_000_000));
        assert_eq!(as_integer(&json!(" 42 ")), Some(42));
        assert_eq!(as_integer(&json!("soon")), None);
        assert_eq!(as_integer(&json!(true)), None);
    }
}
