//! The only configuration value propagated end-to-end per `SPEC_FULL.md`
//! §6 is the scheduler's worker thread count; the socket poll interval and
//! the `tracing` filter directive are exposed alongside it (`SPEC_FULL.md`
//! §9.1's ambient configuration layer) so tests can shorten the hot-poll
//! cadence or quiet the subscriber.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub scheduler_threads: usize,
    pub socket_poll_interval: Duration,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scheduler_threads: num_cpus::get().max(1),
            socket_poll_interval: Duration::from_millis(10),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    fn merge(&mut self, table: &toml::value::Table) {
        if let Some(n) = table.get("scheduler_threads").and_then(|v| v.as_integer()) {
            self.scheduler_threads = n.max(1) as usize;
        }
        if let Some(ms) = table.get("socket_poll_interval_ms").and_then(|v| v.as_integer()) {
            self.socket_poll_interval = Duration::from_millis(ms.max(0) as u64);
        }
        if let Some(filter) = table.get("log_filter").and_then(|v| v.as_str()) {
            self.log_filter = filter.to_string();
        }
    }
}

/// Installs a global `tracing` subscriber filtered by `cfg.log_filter`
/// (an `EnvFilter` directive string, e.g. `"info"` or
/// `"traeger_rs=debug,warn"`). Idempotent: a second call is a no-op rather
/// than a panic, since host code and test harnesses may both want to call
/// it defensively.
pub fn init_logging(cfg: &Config) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cfg.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Loads defaults, then overlays `$RUNTIME_CONF` (default
/// `config/runtime.toml`) if present. A missing or unparsable file is
/// silently ignored; this mirrors the teacher's own best-effort merge.
pub fn load_config() -> Config {
    use std::{env, fs};

    let mut cfg = Config::default();
    let path = env::var("RUNTIME_CONF").unwrap_or_else(|_| "config/runtime.toml".into());
    if let Ok(contents) = fs::read_to_string(&path) {
        if let Ok(toml::Value::Table(table)) = toml::from_str::<toml::Value>(&contents) {
            cfg.merge(&table);
        }
    }
    cfg
}
