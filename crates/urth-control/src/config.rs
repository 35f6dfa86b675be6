// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the urth control plane.

use std::str::FromStr;

use urth_core::store::DEFAULT_MAX_PAGE_SIZE;

/// Default SQLite database location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:.data/urth.db?mode=rwc";

/// Control plane configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite connection URL
    pub database_url: String,
    /// Server-side cap on list page sizes
    pub max_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = match std::env::var("URTH_DATABASE_URL") {
            Ok(url) if url.trim().is_empty() => {
                return Err(ConfigError::Missing("URTH_DATABASE_URL"));
            }
            Ok(url) => url,
            Err(_) => DEFAULT_DATABASE_URL.to_string(),
        };

        let max_page_size = parse_var("URTH_MAX_PAGE_SIZE", DEFAULT_MAX_PAGE_SIZE)?;
        if max_page_size == 0 {
            return Err(ConfigError::Invalid {
                var: "URTH_MAX_PAGE_SIZE",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url,
            max_page_size,
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing or empty.
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    /// An environment variable has an unusable value.
    #[error("Invalid value for {var}: '{value}'")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &["URTH_DATABASE_URL", "URTH_MAX_PAGE_SIZE"];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for var in VARS {
                guard.remove(var);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new();

        let config = Config::from_env().expect("defaults are valid");
        assert_eq!(config, Config::default());
        assert_eq!(config.max_page_size, 512);
    }

    #[test]
    fn test_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("URTH_DATABASE_URL", "sqlite::memory:");
        guard.set("URTH_MAX_PAGE_SIZE", "100");

        let config = Config::from_env().expect("valid overrides");
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn test_empty_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("URTH_DATABASE_URL", "  ");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("URTH_DATABASE_URL"))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let _lock = ENV_MUTEX.lock().unwrap();

        let cases = [
            ("URTH_MAX_PAGE_SIZE", "lots"),
            ("URTH_MAX_PAGE_SIZE", "0"),
            ("URTH_MAX_PAGE_SIZE", "-1"),
        ];

        for (var, value) in cases {
            let mut guard = EnvGuard::new();
            guard.set(var, value);

            match Config::from_env() {
                Err(ConfigError::Invalid { var: got, .. }) => assert_eq!(got, var),
                other => panic!("{var}={value}: expected Invalid, got {other:?}"),
            }
        }
    }
}
