//! Environment-driven configuration (spec §6 env vars, §6 config-store keys).
//!
//! Follows the teacher's `RateLimitConfig::from_env` shape: a `Default`
//! impl with sane values, overridden field-by-field from the environment,
//! never panicking on a missing or malformed variable.

use std::env;

#[derive(Debug, Clone)]
pub struct CitadelConfig {
    /// Root data directory; holds `citadel.socket`, the sqlite file, etc.
    pub data_dir: String,
    /// TCP port for the native line protocol (spec §6 default 504).
    pub tcp_port: u16,
    pub http_port: u16,
    pub https_port: u16,
    /// Size of the worker thread pool servicing line-protocol connections.
    pub worker_threads: usize,
    /// Idle-connection timeout in seconds (spec §5 `SLEEPING`).
    pub sleeping_timeout_secs: u64,
    /// Keepalive probe interval in seconds (spec §5 `S_KEEPALIVE`).
    pub keepalive_secs: u64,
    /// This node's short name; a message is "local" iff its `N` field matches.
    pub node_name: String,
    pub default_header_charset: String,
    pub enable_splice: bool,
    pub zlib_compression_ratio: u32,
    /// Directory served verbatim under `GET /ctdl/s/*` (spec §6 static
    /// asset surface).
    pub static_dir: String,
}

impl Default for CitadelConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            tcp_port: 504,
            http_port: 8080,
            https_port: 4430,
            worker_threads: 32,
            sleeping_timeout_secs: 180,
            keepalive_secs: 30,
            node_name: "citadel".to_string(),
            default_header_charset: "UTF-8".to_string(),
            enable_splice: false,
            zlib_compression_ratio: 6,
            static_dir: "static".to_string(),
        }
    }
}

impl CitadelConfig {
    pub fn from_env() -> Self {
        let mut c = Self::default();

        if let Ok(v) = env::var("CTDL_DIR") {
            c.data_dir = v;
        }
        if let Ok(v) = env::var("CTDL_TCP_PORT")
            && let Ok(n) = v.parse()
        {
            c.tcp_port = n;
        }
        if let Ok(v) = env::var("HTTP_PORT")
            && let Ok(n) = v.parse()
        {
            c.http_port = n;
        }
        if let Ok(v) = env::var("HTTPS_PORT")
            && let Ok(n) = v.parse()
        {
            c.https_port = n;
        }
        if let Ok(v) = env::var("CTDL_WORKER_THREADS")
            && let Ok(n) = v.parse()
        {
            c.worker_threads = n;
        }
        if let Ok(v) = env::var("CTDL_SLEEPING_TIMEOUT")
            && let Ok(n) = v.parse()
        {
            c.sleeping_timeout_secs = n;
        }
        if let Ok(v) = env::var("CTDL_KEEPALIVE_SECS")
            && let Ok(n) = v.parse()
        {
            c.keepalive_secs = n;
        }
        if let Ok(v) = env::var("CTDL_NODE_NAME") {
            c.node_name = v;
        }
        if let Ok(v) = env::var("CTDL_DEFAULT_HEADER_CHARSET") {
            c.default_header_charset = v;
        }
        if let Ok(v) = env::var("CTDL_ENABLE_SPLICE") {
            c.enable_splice = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var("CTDL_ZLIB_COMPRESSION_RATIO")
            && let Ok(n) = v.parse()
        {
            c.zlib_compression_ratio = n;
        }
        if let Ok(v) = env::var("CTDL_STATIC_DIR") {
            c.static_dir = v;
        }

        c
    }

    /// Path to the admin/line-protocol Unix-domain socket (spec §4.7, §6).
    pub fn socket_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("citadel.socket")
    }

    pub fn sqlite_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("citadel.db")
    }
}
