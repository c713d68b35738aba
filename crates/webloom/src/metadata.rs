use crate::error::{Result, WebloomError};
use crate::meta_file::MetaMap;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, deserialize_with = "filter_list")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
    #[serde(default, deserialize_with = "scalar_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(flatten)]
    pub extra: MetaMap,
}

impl Metadata {
    pub fn from_map(path: &Path, map: MetaMap) -> Result<Self> {
        let value = Value::Object(map);
        Metadata::deserialize(&value).map_err(|error| WebloomError::MetadataParse {
            path: path.to_path_buf(),
            block: serde_yml::to_string(&value).unwrap_or_default(),
            message: error.to_string(),
        })
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "filter" => Some(Value::from(self.filter.clone())),
            "layout" => self.layout.clone().map(Value::String),
            "title" => self.title.clone().map(Value::String),
            "destination" => self.destination.clone().map(Value::String),
            "dirty" => self.dirty.map(Value::Bool),
            "extension" => self.extension.clone().map(Value::String),
            _ => self.extra.get(name).cloned(),
        }
    }

    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.extra
            .get(key)
            .and_then(|value| value.as_str().map(String::from))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .unwrap_or_default()
            .partial_cmp(&b.as_f64().unwrap_or_default())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => left.to_string().cmp(&right.to_string()),
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(_) | Value::Object(_) => {
            Err(de::Error::custom("expected a single value, found a collection"))
        }
        scalar => Ok(scalar_to_string(scalar)),
    }
}

fn filter_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| {
                scalar_to_string(item)
                    .ok_or_else(|| de::Error::custom("filter names must be plain values"))
            })
            .collect(),
        Value::Object(_) => Err(de::Error::custom(
            "expected a filter name or a list of filter names",
        )),
        scalar => Ok(scalar_to_string(scalar).into_iter().collect()),
    }
}
