// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

//! Feature flags and field trial parameters readable at startup, before the native
//! configuration engine is initialized.
//!
//! Values reported by the native engine are cached in a persistent store by
//! [`cache_utils::CachedFlagUtils`] and read back during the next run. A read resolves, in
//! order:
//! 1. an override from [`overrides::FeatureOverrides`],
//! 2. the value already returned for the same key during this run,
//! 3. a safe value or default if [`safe_mode::CachedFlagsSafeMode`] is engaged,
//! 4. the cached native value,
//! 5. the declared default.
//!
//! Reads never fail. Misuse (duplicate declarations, malformed overrides, strict override
//! lookups without an override) panics.

#![deny(
  clippy::expect_used,
  clippy::todo,
  clippy::unimplemented,
  clippy::unreachable,
  clippy::unwrap_used
)]


pub mod cache_utils;
pub mod config;
pub mod context;
pub mod flag;
pub mod keys;
pub mod native;
pub mod overrides;
pub mod param;
pub mod persistence;
pub mod registry;
pub mod safe_mode;
pub mod value;
pub mod values_returned;

pub use cache_utils::CachedFlagUtils;
pub use config::{FlagsConfig, SafeModeConfig};
pub use context::{FlagContext, FlagContextBuilder};
pub use flag::{CachedFlag, Flag, PostNativeFlag};
pub use native::NativeOracle;
pub use overrides::{FeatureOverrides, OverrideNativeOracle};
pub use param::{
  AllCachedFieldTrialParameters,
  BooleanCachedFeatureParam,
  CachedFeatureParam,
  CachedFieldTrialParameter,
  DoubleCachedFeatureParam,
  IntCachedFeatureParam,
  StringCachedFeatureParam,
};
pub use safe_mode::{CachedFlagsSafeMode, SafeModeBehavior};
pub use value::{ParamValue, Value, ValueType};

#[cfg(test)]
#[ctor::ctor]
fn test_global_init() {
  cf_test_helpers::test_global_init();
}

//
// Error
//

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("{raw:?} is not a valid {expected:?} value")]
  Parse {
    expected: value::ValueType,
    raw: String,
  },

  #[error("unable to read config file: {0}")]
  Io(#[from] std::io::Error),

  #[error("unable to deserialize config: {0}")]
  Config(#[from] serde_yaml::Error),
}
