use serde_json::Value as Json;

use crate::value::{List, Map, Value};

use super::Format;

pub struct Json;

impl Format for Json {
    fn name(&self) -> &str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, String> {
        serde_json::to_vec(&to_json(value)).map_err(|e| e.to_string())
    }

    fn decode(&self, content: &[u8]) -> Result<Value, String> {
        let json: Json = serde_json::from_slice(content).map_err(|e| e.to_string())?;
        Ok(from_json(&json))
    }
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::UInt(u) => Json::Number((*u).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.clone()),
        Value::List(l) => Json::Array(l.iter().map(to_json).collect()),
        Value::Map(m) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in m.iter() {
                obj.insert(k.clone(), to_json(v));
            }
            Json::Object(obj)
        }
    }
}

fn from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::from_uint(u)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => {
            let mut list = List::new();
            for item in items {
                list.push_back(from_json(item));
            }
            Value::List(list)
        }
        Json::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.set(k.clone(), from_json(v));
            }
            Value::Map(map)
        }
    }
}
