// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The discriminated response envelope: `{ok:true, …}` on success,
//! `{ok:false, error, code, field_errors?}` on failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Failure payload. `code` is a stable machine-readable identifier
/// (e.g. `RUN_ALREADY_ACTIVE`); `error` is for humans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyError {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, String>>,
}

/// A complete reply. Serialization injects the `ok` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok(Map<String, Value>),
    Err(ReplyError),
}

impl Reply {
    pub fn err(code: impl Into<String>, error: impl Into<String>) -> Self {
        Reply::Err(ReplyError { error: error.into(), code: code.into(), field_errors: None })
    }

    pub fn err_with_fields(
        code: impl Into<String>,
        error: impl Into<String>,
        field_errors: BTreeMap<String, String>,
    ) -> Self {
        Reply::Err(ReplyError {
            error: error.into(),
            code: code.into(),
            field_errors: Some(field_errors),
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok(_))
    }
}

/// Build a success reply from any serializable payload. Non-object
/// payloads land under a `data` key.
pub fn ok<T: Serialize>(payload: T) -> Reply {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => Reply::Ok(map),
        Ok(Value::Null) => Reply::Ok(Map::new()),
        Ok(other) => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            Reply::Ok(map)
        }
        Err(e) => Reply::err("INTERNAL", format!("response serialization failed: {e}")),
    }
}

impl Serialize for Reply {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = Map::new();
        match self {
            Reply::Ok(payload) => {
                map.insert("ok".to_string(), Value::Bool(true));
                for (key, value) in payload {
                    map.insert(key.clone(), value.clone());
                }
            }
            Reply::Err(err) => {
                map.insert("ok".to_string(), Value::Bool(false));
                map.insert("error".to_string(), Value::String(err.error.clone()));
                map.insert("code".to_string(), Value::String(err.code.clone()));
                if let Some(fields) = &err.field_errors {
                    let fields: Map<String, Value> = fields
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect();
                    map.insert("field_errors".to_string(), Value::Object(fields));
                }
            }
        }
        Value::Object(map).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Reply {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut map = Map::deserialize(deserializer)?;
        let ok = map
            .remove("ok")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| serde::de::Error::missing_field("ok"))?;
        if ok {
            return Ok(Reply::Ok(map));
        }
        let error = map
            .remove("error")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| serde::de::Error::missing_field("error"))?;
        let code = map
            .remove("code")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| serde::de::Error::missing_field("code"))?;
        let field_errors = map.remove("field_errors").and_then(|v| {
            v.as_object().map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect::<BTreeMap<String, String>>()
            })
        });
        Ok(Reply::Err(ReplyError { error, code, field_errors }))
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
