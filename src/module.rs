//! Dynamic module loader: resolves a stable entry symbol from a shared
//! library and keeps the library loaded for as long as the `Mailbox` it
//! hands back is alive — grounded on `traeger::module::Module`.
//!
//! The platform glue for locating and opening the library is out of
//! scope (`SPEC_FULL.md` §1); this module covers the boundary the spec
//! does define: a stable, C-shaped entry point taking a configuration Map
//! and handing back a Mailbox or an error string. Strings crossing the
//! boundary are allocated with `CString::into_raw` on the module side and
//! reclaimed with `CString::from_raw` here, so a module built against
//! this crate's FFI surface and this crate agree on the allocator; a
//! hand-rolled module that merely returns a string literal would not.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::sync::Arc;

use libloading::{Library, Symbol};
use tracing::{error, info};

use crate::actor::{Mailbox, MailboxInterface};
use crate::error::RuntimeError;
use crate::format;
use crate::promise::Promise;
use crate::scheduler::Scheduler;
use crate::value::{List, Map, Value};

const ENTRY_SYMBOL: &[u8] = b"traeger_module_init\0";

/// The stable shim a loaded module's `send` is invoked through. `ctx` is
/// an opaque pointer the module controls; `send` encodes arguments as a
/// JSON list and expects a JSON-encoded result back, `is_error`
/// distinguishing `Result::Value` from `Result::Error`. `release` is
/// called once, when the last `Mailbox` clone referencing this module
/// instance is dropped.
#[repr(C)]
pub struct CMailbox {
    pub ctx: *mut c_void,
    pub send: unsafe extern "C" fn(
        ctx: *mut c_void,
        name: *const c_char,
        args_json: *const c_char,
        out_json: *mut *mut c_char,
        out_is_error: *mut i32,
    ),
    pub release: unsafe extern "C" fn(ctx: *mut c_void),
}

impl Clone for CMailbox {
    fn clone(&self) -> Self {
        CMailbox { ctx: self.ctx, send: self.send, release: self.release }
    }
}
impl Copy for CMailbox {}

unsafe impl Send for CMailbox {}
unsafe impl Sync for CMailbox {}

type ModuleInitFn = unsafe extern "C" fn(
    config_json: *const c_char,
    out_mailbox: *mut CMailbox,
    out_error: *mut *mut c_char,
) -> bool;

unsafe fn take_c_string(ptr: *mut c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CString::from_raw(ptr).to_string_lossy().into_owned()
}

/// A loaded shared library exposing a single [`Mailbox`]. Dropping the
/// last clone of the `Mailbox` drops this handle's `Library`, unloading
/// it — unless another `Module::mailbox()` clone elsewhere still holds it.
pub struct Module {
    mailbox: Mailbox,
}

impl Module {
    /// Loads `path`, resolves `traeger_module_init`, and calls it with
    /// `configuration` JSON-encoded. Failure to locate the file, resolve
    /// the symbol, or initialise the mailbox surfaces as a
    /// [`RuntimeError::ModuleLoad`].
    pub fn from_path(path: &str, configuration: &Map) -> Result<Module, RuntimeError> {
        let library = unsafe { Library::new(path) }.map_err(|e| {
            error!(path, error = %e, "failed to open module library");
            RuntimeError::ModuleLoad { path: path.to_string(), reason: e.to_string() }
        })?;

        let init: Symbol<ModuleInitFn> = unsafe { library.get(ENTRY_SYMBOL) }.map_err(|_| {
            error!(path, "module library missing traeger_module_init symbol");
            RuntimeError::ModuleLoad {
                path: path.to_string(),
                reason: "failed to find initial symbol".to_string(),
            }
        })?;

        let json = format::require("json").map_err(|e| RuntimeError::ModuleLoad {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let config_json = format::encode_text(json.as_ref(), &Value::Map(configuration.clone()))
            .map_err(|e| RuntimeError::ModuleLoad { path: path.to_string(), reason: e })?;
        let config_cstring = CString::new(config_json).map_err(|e| RuntimeError::ModuleLoad {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let mut c_mailbox = CMailbox {
            ctx: std::ptr::null_mut(),
            send: unreachable_send,
            release: unreachable_release,
        };
        let mut error_ptr: *mut c_char = std::ptr::null_mut();

        let ok = unsafe { init(config_cstring.as_ptr(), &mut c_mailbox, &mut error_ptr) };
        if !ok {
            let reason = unsafe { take_c_string(error_ptr) };
            let reason = if reason.is_empty() { "module initialisation failed".to_string() } else { reason };
            error!(path, reason = %reason, "module load failed");
            return Err(RuntimeError::ModuleLoad { path: path.to_string(), reason });
        }
        info!(path, "module loaded");

        let library = Arc::new(library);
        let interface = Arc::new(ModuleMailbox { c_mailbox, _library: library });
        Ok(Module { mailbox: Mailbox::new(interface) })
    }

    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.clone()
    }
}

unsafe extern "C" fn unreachable_send(
    _ctx: *mut c_void,
    _name: *const c_char,
    _args_json: *const c_char,
    out_json: *mut *mut c_char,
    out_is_error: *mut i32,
) {
    *out_json = std::ptr::null_mut();
    *out_is_error = 1;
}

unsafe extern "C" fn unreachable_release(_ctx: *mut c_void) {}

struct ModuleMailbox {
    c_mailbox: CMailbox,
    _library: Arc<Library>,
}

unsafe impl Send for ModuleMailbox {}
unsafe impl Sync for ModuleMailbox {}

impl Drop for ModuleMailbox {
    fn drop(&mut self) {
        unsafe { (self.c_mailbox.release)(self.c_mailbox.ctx) };
    }
}

impl MailboxInterface for ModuleMailbox {
    fn send(&self, scheduler: &Scheduler, name: &str, args: List) -> Promise {
        let promise = Promise::new(scheduler.clone());

        let json = match format::require("json") {
            Ok(f) => f,
            Err(e) => {
                promise.set_error(e.to_string());
                return promise;
            }
        };
        let encoded = match format::encode_text(json.as_ref(), &Value::List(args)) {
            Ok(s) => s,
            Err(e) => {
                promise.set_error(e);
                return promise;
            }
        };

        let c_mailbox = self.c_mailbox;
        let name = name.to_string();
        let promise_for_task = promise.clone();
        scheduler.schedule(move || {
            let name_c = match CString::new(name) {
                Ok(s) => s,
                Err(e) => {
                    promise_for_task.set_error(e.to_string());
                    return;
                }
            };
            let args_c = match CString::new(encoded) {
                Ok(s) => s,
                Err(e) => {
                    promise_for_task.set_error(e.to_string());
                    return;
                }
            };

            let mut out_json: *mut c_char = std::ptr::null_mut();
            let mut is_error: i32 = 0;
            unsafe {
                (c_mailbox.send)(c_mailbox.ctx, name_c.as_ptr(), args_c.as_ptr(), &mut out_json, &mut is_error);
            }

            if out_json.is_null() {
                promise_for_task.set_error("module returned no result".to_string());
                return;
            }
            let result_text = unsafe { take_c_string(out_json) };
            if is_error != 0 {
                promise_for_task.set_error(result_text);
                return;
            }
            let json = match format::require("json") {
                Ok(f) => f,
                Err(e) => {
                    promise_for_task.set_error(e.to_string());
                    return;
                }
            };
            match format::decode_text(json.as_ref(), &result_text) {
                Ok(value) => {
                    promise_for_task.set_value(value);
                }
                Err(e) => {
                    promise_for_task.set_error(e);
                }
            }
        });

        promise
    }
}

/// Exposes a [`CStr`] helper for modules built against this crate's FFI
/// surface, so they can validate the configuration JSON they receive
/// without depending on `serde_json` themselves.
pub fn decode_config_json(ptr: *const c_char) -> Result<Value, String> {
    if ptr.is_null() {
        return Ok(Value::Map(Map::new()));
    }
    let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    let json = format::require("json").map_err(|e| e.to_string())?;
    format::decode_text(json.as_ref(), &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_reports_error() {
        let result = Module::from_path("/nonexistent/path/to/module.so", &Map::new());
        match result {
            Err(RuntimeError::ModuleLoad { path, .. }) => {
                assert_eq!(path, "/nonexistent/path/to/module.so");
            }
            other => panic!("expected a ModuleLoad error, got {:?}", other.map(|_| ())),
        }
    }
}
