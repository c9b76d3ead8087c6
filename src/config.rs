use std::env;

use tracing::warn;

/// Upper bound on the simulated heap: 1 TiB of address space, reserved but
/// not committed.
pub const DEFAULT_MAX_HEAP_SIZE: usize = 1 << 40;

/// Environment variable overriding [`HeapConfig::max_heap_size`].
pub const MAX_HEAP_SIZE_VAR: &str = "RMALLOC_MAX_HEAP_SIZE";

/// Environment variable overriding [`HeapConfig::verify`].
pub const VERIFY_VAR: &str = "RMALLOC_VERIFY";

/// Knobs for a heap instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
  /// Bytes of address space reserved up front. The heap can never grow
  /// past this.
  pub max_heap_size: usize,
  /// Run the consistency checker after every mutating operation and panic
  /// if it fails, in release builds as well as debug builds.
  pub verify: bool,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      max_heap_size: DEFAULT_MAX_HEAP_SIZE,
      verify: false,
    }
  }
}

impl HeapConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_max_heap_size(
    mut self,
    max_heap_size: usize,
  ) -> Self {
    self.max_heap_size = max_heap_size;
    self
  }

  pub fn with_verify(
    mut self,
    verify: bool,
  ) -> Self {
    self.verify = verify;
    self
  }

  /// Defaults overridden by `RMALLOC_MAX_HEAP_SIZE` (bytes, decimal or
  /// `0x`-prefixed hex) and `RMALLOC_VERIFY` (`1`/`true`/`yes`/`on`).
  /// Unparseable values are ignored with a warning.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Self::default();

    if let Some(raw) = lookup(MAX_HEAP_SIZE_VAR) {
      match parse_size(&raw) {
        Some(size) if size > 0 => config.max_heap_size = size,
        _ => warn!("ignoring {}={:?}: not a positive byte count", MAX_HEAP_SIZE_VAR, raw),
      }
    }

    if let Some(raw) = lookup(VERIFY_VAR) {
      match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => config.verify = true,
        "0" | "false" | "no" | "off" | "" => config.verify = false,
        _ => warn!("ignoring {}={:?}: expected a boolean", VERIFY_VAR, raw),
      }
    }

    config
  }
}

fn parse_size(raw: &str) -> Option<usize> {
  let raw = raw.trim().replace('_', "");
  match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
    Some(hex) => usize::from_str_radix(hex, 16).ok(),
    None => raw.parse().ok(),
  }
}
