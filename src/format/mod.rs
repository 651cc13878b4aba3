//! Codec registry: a `Format` is a name plus a pure `encode`/`decode` pair
//! over `Value`. Three are built in (`json`, `yaml`, `msgpack`); lookup by
//! name is how a socket or a host picks which wire representation to use —
//! grounded on `traeger::format::Format`.

mod json;
mod msgpack;
mod yaml;

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::RuntimeError;
use crate::value::Value;

/// A named, pure codec. `encode`/`decode` never panic; failures are
/// reported as `Err(message)`. The carrier is `Vec<u8>`/`&[u8]` rather than
/// `String` so a binary format (MessagePack) round-trips its real bytes
/// instead of smuggling them through a text type.
pub trait Format: Send + Sync {
    fn name(&self) -> &str;
    fn encode(&self, value: &Value) -> Result<Vec<u8>, String>;
    fn decode(&self, content: &[u8]) -> Result<Value, String>;
}

/// Encodes `value` as text suitable for a `String`-typed wire frame or FFI
/// boundary. `json` and `yaml` always produce valid UTF-8; a binary format
/// that can't fit a text frame surfaces as an error here instead of
/// corrupting its payload the way a lossy byte/char cast would.
pub fn encode_text(format: &dyn Format, value: &Value) -> Result<String, String> {
    let bytes = format.encode(value)?;
    String::from_utf8(bytes)
        .map_err(|_| format!("format {} produced non-UTF-8 output for a text frame", format.name()))
}

/// Decodes `content` — the counterpart to [`encode_text`].
pub fn decode_text(format: &dyn Format, content: &str) -> Result<Value, String> {
    format.decode(content.as_bytes())
}

struct Registry {
    formats: Vec<(String, Arc<dyn Format>)>,
}

impl Registry {
    fn new() -> Self {
        let mut formats: Vec<(String, Arc<dyn Format>)> = Vec::new();
        formats.push(("json".to_string(), Arc::new(json::Json) as Arc<dyn Format>));
        formats.push(("yaml".to_string(), Arc::new(yaml::Yaml) as Arc<dyn Format>));
        formats.push((
            "msgpack".to_string(),
            Arc::new(msgpack::MsgPack) as Arc<dyn Format>,
        ));
        Registry { formats }
    }
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::new()));

/// Looks up a built-in or previously-[`register`]ed format by name.
pub fn by_name(name: &str) -> Option<Arc<dyn Format>> {
    REGISTRY
        .read()
        .expect("format registry lock poisoned")
        .formats
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, f)| f.clone())
}

/// Adds a user-defined format under a name not already taken.
pub fn register(format: Arc<dyn Format>) -> Result<(), RuntimeError> {
    let mut registry = REGISTRY.write().expect("format registry lock poisoned");
    if registry.formats.iter().any(|(n, _)| n == format.name()) {
        return Err(RuntimeError::DuplicateFormat(format.name().to_string()));
    }
    registry.formats.push((format.name().to_string(), format));
    Ok(())
}

/// Looks up `name`, yielding [`RuntimeError::UnknownFormat`] on a miss.
pub fn require(name: &str) -> Result<Arc<dyn Format>, RuntimeError> {
    by_name(name).ok_or_else(|| RuntimeError::UnknownFormat(name.to_string()))
}
