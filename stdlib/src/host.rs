//! Standard host capabilities.
//!
//! - clock.now(): milliseconds since the Unix epoch
//! - storage.get(key) / storage.set(key, value) / storage.remove(key): string store owned by the
//!   [`HostStorage`] the capabilities were registered with
//! - console.log(...args): forwards to `tracing` at info level
//! - string.length(s): length in UTF-16 code units

use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::Utc;
use dashmap::DashMap;
use tagvm_core::{
    Thrown, Val,
    vm::{Flow, HandlerCx, HostCapabilities},
};

/// Entries behind the `storage.*` capabilities. Clones share the same entries, so a host can
/// keep one to inspect or clear what bytecode stored.
#[derive(Debug, Clone, Default)]
pub struct HostStorage {
    entries: Arc<DashMap<Arc<str>, Val>>,
}

impl HostStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Val> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Missing keys read as null.
    fn read(&self, args: &[Val]) -> Result<Val> {
        let key = key_arg("storage.get", args)?;
        Ok(self.get(&key).unwrap_or(Val::Nil))
    }

    /// Values are stored in their string form.
    fn write(&self, args: &[Val]) -> Result<Val> {
        let key = key_arg("storage.set", args)?;
        let value = args
            .get(1)
            .ok_or_else(|| anyhow!("storage.set() takes exactly 2 arguments"))?;
        self.entries.insert(key, Val::from(value.to_string()));
        Ok(Val::Undefined)
    }

    fn remove(&self, args: &[Val]) -> Result<Val> {
        let key = key_arg("storage.remove", args)?;
        self.entries.remove(&key);
        Ok(Val::Undefined)
    }
}

/// Registers every standard capability into `host`, replacing same-named entries.
///
/// The `storage.*` capabilities read and write `storage`.
pub fn register_host_capabilities(host: &mut HostCapabilities, storage: &HostStorage) {
    host.register("clock.now", clock_now);
    let store = storage.clone();
    host.register("storage.get", move |args: &[Val]| store.read(args));
    let store = storage.clone();
    host.register("storage.set", move |args: &[Val]| store.write(args));
    let store = storage.clone();
    host.register("storage.remove", move |args: &[Val]| store.remove(args));
    host.register("console.log", console_log);
    host.register("string.length", string_length);
}

fn clock_now(_args: &[Val]) -> Result<Val> {
    Ok(Val::Int(Utc::now().timestamp_millis()))
}

fn key_arg(name: &str, args: &[Val]) -> Result<Arc<str>> {
    match args.first() {
        Some(Val::Undefined) | None => Err(anyhow!("{}() requires a key", name)),
        Some(key) => Ok(key.to_key()),
    }
}

fn console_log(args: &[Val]) -> Result<Val> {
    let line = args.iter().map(Val::to_string).collect::<Vec<_>>().join(" ");
    tracing::info!(target: "tagvm::console", "{}", line);
    Ok(Val::Undefined)
}

fn string_length(args: &[Val]) -> Result<Val> {
    match args.first() {
        Some(Val::Str(s)) => Ok(Val::Int(s.encode_utf16().count() as i64)),
        Some(other) => Err(anyhow!("string.length() expects a string, got {}", other.type_name())),
        None => Err(anyhow!("string.length() takes exactly 1 argument")),
    }
}

fn host_call_with<const N: usize>(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let name = cx.operand()?;
    let args = cx.operands::<N>()?;
    let Some(name) = name.as_str() else {
        return Err(Thrown::exception(format!(
            "TypeError: host capability name must be a string, got {}",
            name.type_name()
        )));
    };
    let value = cx.call_host(name, &args)?;
    cx.write(value)?;
    Ok(Flow::Continue)
}

pub(crate) fn host_call_1(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    host_call_with::<1>(cx)
}

pub(crate) fn host_call_2(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    host_call_with::<2>(cx)
}
