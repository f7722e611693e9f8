// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./flag_test.rs"]
mod flag_test;

use crate::context::FlagContext;
use crate::keys;
use crate::registry::Declaration;
use crate::value::ValueType;
use std::sync::Arc;

//
// Flag
//

/// A boolean feature toggle.
pub trait Flag: Send + Sync {
  fn feature_name(&self) -> &str;

  fn is_enabled(&self) -> bool;
}

fn register_flag(context: &FlagContext, feature: &str) -> String {
  let key = keys::flag_key(feature);
  context.registry().register(
    &key,
    Declaration {
      feature: feature.to_string(),
      param: None,
      value_type: ValueType::Bool,
    },
  );
  key
}

//
// CachedFlag
//

/// A flag readable before the native engine is initialized. Reads return the value the native
/// engine reported during a previous run, subject to safe mode, and stay stable for the rest of
/// the run once read.
pub struct CachedFlag {
  context: Arc<FlagContext>,
  feature: String,
  key: String,
  default: bool,
}

impl CachedFlag {
  /// # Panics
  ///
  /// Panics if a flag for `feature` was already declared against `context`.
  #[must_use]
  pub fn new(context: &Arc<FlagContext>, feature: &str, default: bool) -> Self {
    let key = register_flag(context, feature);
    Self {
      context: context.clone(),
      feature: feature.to_string(),
      key,
      default,
    }
  }

  #[must_use]
  pub const fn default_value(&self) -> bool {
    self.default
  }

  /// The persisted key this flag is cached under.
  #[must_use]
  pub fn cache_key(&self) -> &str {
    &self.key
  }
}

impl Flag for CachedFlag {
  fn feature_name(&self) -> &str {
    &self.feature
  }

  fn is_enabled(&self) -> bool {
    if let Some(enabled) = self.context.overrides().flag(&self.feature) {
      return enabled;
    }

    self.context.read_cached(&self.key, &self.default)
  }
}

//
// PostNativeFlag
//

/// A flag which is never cached: it reports its default until the native engine is ready and
/// the native value afterwards. Suitable for code that only runs late in startup.
pub struct PostNativeFlag {
  context: Arc<FlagContext>,
  feature: String,
  default: bool,
}

impl PostNativeFlag {
  /// # Panics
  ///
  /// Panics if a flag for `feature` was already declared against `context`.
  #[must_use]
  pub fn new(context: &Arc<FlagContext>, feature: &str, default: bool) -> Self {
    register_flag(context, feature);
    Self {
      context: context.clone(),
      feature: feature.to_string(),
      default,
    }
  }
}

impl Flag for PostNativeFlag {
  fn feature_name(&self) -> &str {
    &self.feature
  }

  fn is_enabled(&self) -> bool {
    if let Some(enabled) = self.context.overrides().flag(&self.feature) {
      return enabled;
    }

    let native = self.context.native();
    if native.is_ready() {
      native.is_enabled_in_native(&self.feature)
    } else {
      self.default
    }
  }
}
