//! Server configuration.

use crate::http::body::DEFAULT_MAX_BODY_SIZE;

use super::ServerError;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

const ADDR_VAR: &str = "TETHER_ADDR";
const MAX_BODY_SIZE_VAR: &str = "TETHER_MAX_BODY_SIZE";

/// Settings for a [`Server`](super::Server).
///
/// ```rust
/// use tether::ServerConfig;
///
/// let config = ServerConfig::default()
///     .with_addr("0.0.0.0:3000")
///     .with_max_body_size(1024 * 1024);
/// assert_eq!(config.max_body_size, 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `127.0.0.1:8080` or `[::]:0`.
    pub addr: String,
    /// Most bytes a single body read will buffer before failing with `413`.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_owned(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `TETHER_ADDR` and `TETHER_MAX_BODY_SIZE`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if `TETHER_MAX_BODY_SIZE` is not a
    /// byte count.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = Self::default();
        if let Some(addr) = lookup(ADDR_VAR) {
            config.addr = addr;
        }
        if let Some(raw) = lookup(MAX_BODY_SIZE_VAR) {
            config.max_body_size = raw.trim().parse().map_err(|_| ServerError::Config {
                key: MAX_BODY_SIZE_VAR,
                value: raw.clone(),
            })?;
        }
        Ok(config)
    }

    /// Sets the listen address; `127.0.0.1:0` picks a free port.
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Sets the per-request cap applied by the body readers.
    #[must_use]
    pub fn with_max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.max_body_size, 8 * 1024 * 1024);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("TETHER_ADDR", "0.0.0.0:9000"),
            ("TETHER_MAX_BODY_SIZE", " 4096 "),
        ]))
        .unwrap();
        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.max_body_size, 4096);
    }

    #[test]
    fn missing_variables_keep_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn bad_body_size_is_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("TETHER_MAX_BODY_SIZE", "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ServerError::Config { key: "TETHER_MAX_BODY_SIZE", ref value } if value == "lots"
        ));
    }
}
