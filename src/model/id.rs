//! Record id normalization.
//!
//! The workflow api hands out numeric ids while other producers use strings.
//! Ids are kept as strings everywhere inside the crate.

use serde::{Deserialize, Deserializer, de};

pub(crate) fn deserialize<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("invalid id: {}", other))),
    }
}

pub(crate) fn deserialize_nullable_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Record {
        #[serde(deserialize_with = "super::deserialize")]
        id: String,
    }

    #[test]
    fn test_numeric_and_string_ids() {
        let r: Record = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(r.id, "42");
        let r: Record = serde_json::from_str(r#"{"id": "a1"}"#).unwrap();
        assert_eq!(r.id, "a1");
        let r: Record = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert_eq!(r.id, "");
    }

    #[test]
    fn test_invalid_id() {
        assert!(serde_json::from_str::<Record>(r#"{"id": [1]}"#).is_err());
    }
}
