use serde_yaml::Value as Yml;

use crate::value::{List, Map, Value};

use super::Format;

pub struct Yaml;

impl Format for Yaml {
    fn name(&self) -> &str {
        "yaml"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, String> {
        serde_yaml::to_string(&to_yaml(value)).map(String::into_bytes).map_err(|e| e.to_string())
    }

    /// Decoding deliberately produces only `Null`/`String`/`List`/`Map`:
    /// YAML scalars arrive untyped from `serde_yaml` and are rendered back
    /// to their literal text rather than guessed at as Bool/Int/Float.
    fn decode(&self, content: &[u8]) -> Result<Value, String> {
        let text = std::str::from_utf8(content).map_err(|e| e.to_string())?;
        let yaml: Yml = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
        Ok(from_yaml(&yaml))
    }
}

fn to_yaml(value: &Value) -> Yml {
    match value {
        Value::Null => Yml::Null,
        Value::Bool(b) => Yml::Bool(*b),
        Value::Int(i) => Yml::Number((*i).into()),
        Value::UInt(u) => Yml::Number((*u).into()),
        Value::Float(f) => Yml::Number((*f).into()),
        Value::String(s) => Yml::String(s.clone()),
        Value::List(l) => Yml::Sequence(l.iter().map(to_yaml).collect()),
        Value::Map(m) => {
            let mut mapping = serde_yaml::Mapping::new();
            for (k, v) in m.iter() {
                mapping.insert(Yml::String(k.clone()), to_yaml(v));
            }
            Yml::Mapping(mapping)
        }
    }
}

fn from_yaml(yaml: &Yml) -> Value {
    match yaml {
        Yml::Null => Value::Null,
        Yml::Bool(b) => Value::String(b.to_string()),
        Yml::Number(n) => Value::String(n.to_string()),
        Yml::String(s) => Value::String(s.clone()),
        Yml::Sequence(items) => {
            let mut list = List::new();
            for item in items {
                list.push_back(from_yaml(item));
            }
            Value::List(list)
        }
        Yml::Mapping(mapping) => {
            let mut map = Map::new();
            for (k, v) in mapping {
                let key = k.as_str().map(str::to_string).unwrap_or_else(|| {
                    serde_yaml::to_string(k).unwrap_or_default().trim().to_string()
                });
                map.set(key, from_yaml(v));
            }
            Value::Map(map)
        }
        Yml::Tagged(tagged) => from_yaml(&tagged.value),
    }
}
