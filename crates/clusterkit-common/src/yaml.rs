//! YAML stream parsing.
//!
//! Manifests are parsed with yaml-rust2 and converted to `serde_json::Value`
//! so the rest of clusterkit works on a single document model. Empty
//! documents (`---` followed by nothing, or only comments) are dropped from
//! multi-document streams.

use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::Error;

/// Parse a single YAML document. Returns `Value::Null` for empty input.
pub fn parse_yaml(input: &str) -> Result<Value, Error> {
    let docs = load(input)?;
    match docs.into_iter().next() {
        Some(doc) => yaml_to_json(doc),
        None => Ok(Value::Null),
    }
}

/// Parse a multi-document YAML stream, skipping empty documents.
pub fn parse_yaml_multi(input: &str) -> Result<Vec<Value>, Error> {
    load(input)?
        .into_iter()
        .map(yaml_to_json)
        .filter(|doc| !matches!(doc, Ok(Value::Null)))
        .collect()
}

/// Parse either a JSON document or a YAML stream.
///
/// Content starting with `{` is treated as a single JSON object; anything
/// else goes through the YAML loader.
pub fn parse_documents(input: &str) -> Result<Vec<Value>, Error> {
    if input.trim_start().starts_with('{') {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| Error::serialization(format!("invalid JSON document: {}", e)))?;
        return Ok(vec![value]);
    }
    parse_yaml_multi(input)
}

fn load(input: &str) -> Result<Vec<Yaml>, Error> {
    YamlLoader::load_from_str(input)
        .map_err(|e| Error::serialization(format!("invalid YAML: {}", e)))
}

fn yaml_to_json(yaml: Yaml) -> Result<Value, Error> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e| Error::serialization(format!("invalid float {:?}: {}", s, e)))?;
            Ok(Number::from_f64(f).map_or(Value::Null, Value::Number))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(items) => items
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) | Yaml::Real(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Boolean(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    other => {
                        return Err(Error::serialization(format!(
                            "unsupported YAML key {:?}",
                            other
                        )))
                    }
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>, _>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(Error::serialization("YAML aliases are not supported")),
        Yaml::BadValue => Err(Error::serialization("bad YAML value")),
    }
}
