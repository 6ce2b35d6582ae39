//! Environment configuration.

use std::env;
use std::path::PathBuf;

pub const STORAGE_DIR_ENV_VAR: &str = "CHAT_SESSION_STORAGE_DIR";
pub const STORAGE_KEY_ENV_VAR: &str = "CHAT_SESSION_STORAGE_KEY";
pub const WELCOME_MESSAGE_ENV_VAR: &str = "CHAT_SESSION_WELCOME_MESSAGE";
pub const DISABLE_WELCOME_ENV_VAR: &str = "CHAT_SESSION_DISABLE_WELCOME";
pub const SYSTEM_INSTRUCTIONS_ENV_VAR: &str = "CHAT_SESSION_SYSTEM_INSTRUCTIONS";
pub const LOG_ENV_VAR: &str = "CHAT_SESSION_LOG";

pub const DEFAULT_STORAGE_KEY: &str = session_store::DEFAULT_STORAGE_KEY;
pub const DEFAULT_LOG_FILTER: &str = "warn";
pub const DEFAULT_WELCOME_MESSAGE: &str =
    "Hi! I'm your kitchen assistant. Ask for a full recipe, or tell me what you have in the pantry and I'll suggest ideas.";
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str =
    "You are a friendly cooking assistant. Prefer short numbered steps, suggest substitutions for dietary needs, and say so when you are unsure.";

/// Options that used to differ between forked screens of the same chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Directory holding the durable slot; `None` lets the host decide.
    pub storage_dir: Option<PathBuf>,
    pub storage_key: String,
    /// Greeting injected into empty sessions; `None` disables injection.
    pub welcome_message: Option<String>,
    pub system_instructions: String,
    pub quick_prompts: Vec<String>,
    pub log_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            welcome_message: Some(DEFAULT_WELCOME_MESSAGE.to_string()),
            system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
            quick_prompts: default_quick_prompts(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source; blank values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string_opt = |key: &str| {
            lookup(key).and_then(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };
        let flag = |key: &str| lookup(key).map(|value| value == "1").unwrap_or(false);

        let defaults = Self::default();
        let welcome_message = if flag(DISABLE_WELCOME_ENV_VAR) {
            None
        } else {
            string_opt(WELCOME_MESSAGE_ENV_VAR).or(defaults.welcome_message)
        };

        Self {
            storage_dir: string_opt(STORAGE_DIR_ENV_VAR).map(PathBuf::from),
            storage_key: string_opt(STORAGE_KEY_ENV_VAR).unwrap_or(defaults.storage_key),
            welcome_message,
            system_instructions: string_opt(SYSTEM_INSTRUCTIONS_ENV_VAR)
                .unwrap_or(defaults.system_instructions),
            quick_prompts: defaults.quick_prompts,
            log_filter: string_opt(LOG_ENV_VAR).unwrap_or(defaults.log_filter),
        }
    }

    #[must_use]
    pub fn without_welcome(mut self) -> Self {
        self.welcome_message = None;
        self
    }
}

fn default_quick_prompts() -> Vec<String> {
    [
        "Quick Indian breakfast with oats",
        "Simple Italian pasta dinner",
        "3-dish North Indian thali",
        "Healthy vegetarian lunchbox",
        "Mexican chicken dinner < 30 min",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn config_from(pairs: &[(&str, &str)]) -> SessionConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        SessionConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_variables_use_defaults() {
        assert_eq!(config_from(&[]), SessionConfig::default());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[
            (STORAGE_KEY_ENV_VAR, "   "),
            (WELCOME_MESSAGE_ENV_VAR, "\n\t"),
            (STORAGE_DIR_ENV_VAR, ""),
        ]);

        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(
            config.welcome_message.as_deref(),
            Some(DEFAULT_WELCOME_MESSAGE)
        );
        assert!(config.storage_dir.is_none());
    }

    #[test]
    fn overrides_are_trimmed() {
        let config = config_from(&[
            (STORAGE_DIR_ENV_VAR, " /tmp/chat "),
            (STORAGE_KEY_ENV_VAR, " kitchen "),
            (WELCOME_MESSAGE_ENV_VAR, " Hello there "),
            (LOG_ENV_VAR, "debug"),
        ]);

        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/chat")));
        assert_eq!(config.storage_key, "kitchen");
        assert_eq!(config.welcome_message.as_deref(), Some("Hello there"));
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn disable_flag_requires_exact_one() {
        assert!(config_from(&[(DISABLE_WELCOME_ENV_VAR, "1")])
            .welcome_message
            .is_none());
        assert!(config_from(&[(DISABLE_WELCOME_ENV_VAR, "true")])
            .welcome_message
            .is_some());
    }

    #[test]
    fn from_env_reads_process_environment() {
        let _lock = env_lock();
        let _g1 = set_env_guard(STORAGE_KEY_ENV_VAR, Some("from-env"));
        let _g2 = set_env_guard(DISABLE_WELCOME_ENV_VAR, None);

        let config = SessionConfig::from_env();
        assert_eq!(config.storage_key, "from-env");
        assert!(config.welcome_message.is_some());
    }
}
