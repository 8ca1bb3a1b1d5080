//! Ambient resource limits for a single interpreter run (`SPEC_FULL.md` §4.5's
//! recursion guard, plus the analogous heap/output caps). None of this is a
//! language feature; it exists so a pathological program (unbounded
//! recursion, an unbounded heap-allocation loop, an infinite `OUTPUT` loop)
//! can never take down the host process instead of raising a `RuntimeError`.
//!
//! Mirrors `gdlk`'s `HardwareSpec`/`ProgramSpec`: a `Default`-backed,
//! `serde`-loadable, `validator`-checked spec wrapped in [Valid] before use.

use failure::Fail;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::Path;
use validator::{Validate, ValidationErrors};

/// Resource limits enforced by [`crate::interp::run`].
///
/// Defaults are generous enough that no program in this language's own test
/// suite can trip them; they exist only to stop a runaway user program, not
/// to constrain legitimate ones.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum nested procedure/function/constructor/`SUPER` call depth
    /// before a `RuntimeError` ("call stack exhausted") is raised.
    #[validate(range(min = 1, max = 1_000_000))]
    pub max_call_depth: usize,

    /// Maximum live heap allocations (`NEW`, `@expr`, object construction)
    /// permitted over the lifetime of a run.
    #[validate(range(min = 1, max = 100_000_000))]
    pub max_heap_allocations: usize,

    /// Maximum number of bytes `OUTPUT`/`WRITEFILE` may accumulate in total.
    #[validate(range(min = 1, max = 1_000_000_000))]
    pub max_output_bytes: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 2048,
            max_heap_allocations: 1_000_000,
            max_output_bytes: 64 * 1024 * 1024,
        }
    }
}

/// A small wrapper indicating the wrapped value has passed [`Validate`].
/// Can only be constructed via [`Valid::validate`].
#[derive(Copy, Clone, Debug)]
pub struct Valid<T: Validate> {
    inner: T,
}

impl<T: Validate> Valid<T> {
    pub fn validate(value: T) -> Result<Self, ValidationErrors> {
        value.validate()?;
        Ok(Self { inner: value })
    }
}

impl<T: Validate> Deref for Valid<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl Default for Valid<RunConfig> {
    fn default() -> Self {
        Valid::validate(RunConfig::default()).expect("RunConfig::default() must be valid")
    }
}

/// Errors loading or validating a [`RunConfig`] from disk.
#[derive(Debug, Fail)]
pub enum ConfigError {
    #[fail(display = "{}", _0)]
    Io(std::io::Error),
    #[fail(display = "{}", _0)]
    Json(serde_json::Error),
    #[fail(display = "{}", _0)]
    Invalid(ValidationErrors),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

impl From<ValidationErrors> for ConfigError {
    fn from(e: ValidationErrors) -> Self {
        ConfigError::Invalid(e)
    }
}

/// Loads a `RunConfig` from a JSON file, or falls back to `RunConfig::default()`
/// when `path` is `None`. Either way the result is validated before return.
pub fn load_config(path: Option<&Path>) -> Result<Valid<RunConfig>, ConfigError> {
    let config = match path {
        None => RunConfig::default(),
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        }
    };
    Ok(Valid::validate(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_call_depth_is_rejected() {
        let cfg = RunConfig {
            max_call_depth: 0,
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_config_with_no_path_uses_default() {
        let valid = load_config(None).unwrap();
        assert_eq!(valid.max_call_depth, RunConfig::default().max_call_depth);
    }

    #[test]
    fn test_load_config_rejects_invalid_json_file() {
        let dir = std::env::temp_dir().join("prescribe_config_test_invalid.json");
        std::fs::write(&dir, r#"{"max_call_depth": 0, "max_heap_allocations": 10, "max_output_bytes": 10}"#).unwrap();
        let result = load_config(Some(&dir));
        std::fs::remove_file(&dir).ok();
        assert!(result.is_err());
    }
}
