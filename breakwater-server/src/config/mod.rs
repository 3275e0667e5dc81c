mod parser;
mod tokenizer;

pub use parser::{parse_config, parse_config_file, ConfigError};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// One `server { ... }` block: a listening endpoint plus its routing table.
/// Immutable once parsing succeeds; the event loop owns it for the process
/// lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub server_names: Vec<String>,
    pub error_pages: HashMap<u16, String>,
    pub max_body_size: usize,
    pub locations: Vec<Location>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            server_names: Vec::new(),
            error_pages: HashMap::new(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            locations: Vec::new(),
        }
    }
}

/// One `location <prefix> { ... }` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub methods: Vec<String>,
    pub root: String,
    pub autoindex: bool,
    pub index_files: Vec<String>,
    pub upload_path: String,
    pub cgi_extensions: HashMap<String, String>,
    /// `"<3xx-code> <url>"` or `"<url>"`; empty means no redirect.
    pub redirect: String,
}

impl Location {
    pub fn has_upload_path(&self) -> bool {
        !self.upload_path.is_empty()
    }

    pub fn has_redirect(&self) -> bool {
        !self.redirect.is_empty()
    }

    pub fn interpreter_for(&self, extension: &str) -> Option<&str> {
        self.cgi_extensions.get(extension).map(String::as_str)
    }
}
