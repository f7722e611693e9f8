// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

use crate::Error;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_CRASH_STREAK_THRESHOLD: u32 = 2;

//
// SafeModeConfig
//

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SafeModeConfig {
  /// Number of consecutive runs without a clean checkpoint after which the next run engages safe
  /// mode.
  pub crash_streak_threshold: u32,

  /// Version of the running binary. Safe values recorded under a different version are never
  /// used.
  pub version: String,
}

impl Default for SafeModeConfig {
  fn default() -> Self {
    Self {
      crash_streak_threshold: DEFAULT_CRASH_STREAK_THRESHOLD,
      version: env!("CARGO_PKG_VERSION").to_string(),
    }
  }
}

//
// FlagsConfig
//

/// Top level configuration. The expected YAML looks like:
///
/// ```yaml
/// safe_mode:
///   crash_streak_threshold: 2
///   version: "120.0.6099.1"
/// ```
///
/// Every field is optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FlagsConfig {
  pub safe_mode: SafeModeConfig,
}

impl FlagsConfig {
  pub fn from_yaml_str(yaml: &str) -> Result<Self, Error> {
    Ok(serde_yaml::from_str(yaml)?)
  }

  pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, Error> {
    let path = path.as_ref();
    log::debug!("loading flags config from {}", path.display());
    Self::from_yaml_str(&std::fs::read_to_string(path)?)
  }

  #[must_use]
  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.safe_mode.version = version.into();
    self
  }
}
