use rmpv::Value as Pack;

use crate::value::{List, Map, Value};

use super::Format;

pub struct MsgPack;

impl Format for MsgPack {
    fn name(&self) -> &str {
        "msgpack"
    }

    /// MessagePack is a binary format; it carries its encoded bytes as a
    /// real `Vec<u8>`, not a string. Moving this over a `String`-typed wire
    /// frame or FFI boundary goes through [`super::encode_text`]/
    /// [`super::decode_text`], which fail loudly on non-UTF-8 output rather
    /// than silently corrupting it.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, String> {
        let packed = to_pack(value);
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &packed).map_err(|e| e.to_string())?;
        Ok(bytes)
    }

    fn decode(&self, content: &[u8]) -> Result<Value, String> {
        let mut cursor = std::io::Cursor::new(content);
        let packed = rmpv::decode::read_value(&mut cursor).map_err(|e| e.to_string())?;
        Ok(from_pack(&packed))
    }
}

fn to_pack(value: &Value) -> Pack {
    match value {
        Value::Null => Pack::Nil,
        Value::Bool(b) => Pack::Boolean(*b),
        Value::Int(i) => Pack::from(*i),
        Value::UInt(u) => Pack::from(*u),
        Value::Float(f) => Pack::from(*f),
        Value::String(s) => Pack::String(s.clone().into()),
        Value::List(l) => Pack::Array(l.iter().map(to_pack).collect()),
        Value::Map(m) => Pack::Map(
            m.iter()
                .map(|(k, v)| (Pack::String(k.clone().into()), to_pack(v)))
                .collect(),
        ),
    }
}

fn from_pack(packed: &Pack) -> Value {
    match packed {
        Pack::Nil => Value::Null,
        Pack::Boolean(b) => Value::Bool(*b),
        Pack::Integer(i) => {
            if let Some(u) = i.as_u64() {
                if i.as_i64().is_none() {
                    return Value::from_uint(u);
                }
            }
            Value::Int(i.as_i64().unwrap_or(0))
        }
        Pack::F32(f) => Value::Float(*f as f64),
        Pack::F64(f) => Value::Float(*f),
        Pack::String(s) => Value::String(s.as_str().unwrap_or_default().to_string()),
        // `Value` has no binary variant; a `bin`-typed element from an
        // externally-crafted message is the only way this is reached, since
        // `to_pack` never emits `Pack::Binary` itself.
        Pack::Binary(bytes) => {
            Value::String(bytes.iter().map(|b| *b as char).collect())
        }
        Pack::Array(items) => {
            let mut list = List::new();
            for item in items {
                list.push_back(from_pack(item));
            }
            Value::List(list)
        }
        Pack::Map(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                let key = k.as_str().map(str::to_string).unwrap_or_else(|| k.to_string());
                map.set(key, from_pack(v));
            }
            Value::Map(map)
        }
        Pack::Ext(_, _) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_nested_structure() {
        let mut account = Map::new();
        account.set("name", Value::from("ada"));
        account.set("balance", Value::Float(100.5));
        let mut tags = List::new();
        tags.push_back(Value::from("vip"));
        account.set("tags", Value::List(tags));
        let value = Value::Map(account);

        let codec = MsgPack;
        let encoded = codec.encode(&value).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_reports_truncated_input() {
        let codec = MsgPack;
        assert!(codec.decode(&[]).is_err());
    }

    #[test]
    fn encode_produces_real_bytes_not_a_char_cast_string() {
        let codec = MsgPack;
        let encoded = codec.encode(&Value::Int(-1)).unwrap();
        // A negative fixint round-trips as a single byte >= 0xe0; the old
        // byte-to-char hack would instead have stored it as a String.
        assert!(encoded.iter().any(|&b| b >= 0xe0));
    }

    #[test]
    fn large_unsigned_integer_survives_round_trip() {
        let codec = MsgPack;
        let big = Value::UInt((i64::MAX as u64) + 42);
        let encoded = codec.encode(&big).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), big);
    }
}
