// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

//! In-memory overrides which take priority over every other source of flag values. Intended for
//! tests and local experimentation.
//!
//! Lookups come in two flavors. The plain lookups used by flag declarations return `None` when
//! nothing is overridden. The strict lookups used in place of the native engine fail loudly when
//! overrides are in use but the queried key was never set, unless defaults have been explicitly
//! allowed with [`FeatureOverrides::set_allow_defaults`].

#[cfg(test)]
#[path = "./overrides_test.rs"]
mod overrides_test;

use crate::native::NativeOracle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct OverrideState {
  flags: HashMap<String, bool>,
  // feature -> param -> raw value
  params: HashMap<String, HashMap<String, String>>,
  // Set once any override has been applied; strict lookups only fail while active.
  active: bool,
  allow_defaults: bool,
}

//
// FeatureOverrides
//

#[derive(Default)]
pub struct FeatureOverrides {
  state: Mutex<OverrideState>,
}

impl FeatureOverrides {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn enable(&self, feature: &str) {
    self.builder().enable(feature).apply();
  }

  pub fn disable(&self, feature: &str) {
    self.builder().disable(feature).apply();
  }

  pub fn override_param(&self, feature: &str, param: &str, value: impl ToString) {
    self.builder().param(feature, param, value).apply();
  }

  /// Starts a set of overrides which are applied together.
  #[must_use]
  pub fn builder(&self) -> OverridesBuilder<'_> {
    OverridesBuilder {
      overrides: self,
      flags: vec![],
      params: vec![],
    }
  }

  /// When set, strict lookups of keys without an override return `None` instead of panicking.
  pub fn set_allow_defaults(&self, allow_defaults: bool) {
    self.state.lock().allow_defaults = allow_defaults;
  }

  /// Drops every override and leaves strict mode.
  pub fn remove_all(&self) {
    *self.state.lock() = OverrideState::default();
  }

  #[must_use]
  pub fn is_active(&self) -> bool {
    self.state.lock().active
  }

  #[must_use]
  pub fn flag(&self, feature: &str) -> Option<bool> {
    self.state.lock().flags.get(feature).copied()
  }

  #[must_use]
  pub fn param(&self, feature: &str, param: &str) -> Option<String> {
    self
      .state
      .lock()
      .params
      .get(feature)
      .and_then(|params| params.get(param))
      .cloned()
  }

  /// All overridden params of `feature`, or `None` if none are overridden.
  #[must_use]
  pub fn params_for_feature(&self, feature: &str) -> Option<HashMap<String, String>> {
    self.state.lock().params.get(feature).cloned()
  }

  /// # Panics
  ///
  /// Panics if overrides are active, `feature` has none and defaults are not allowed.
  #[must_use]
  pub fn flag_strict(&self, feature: &str) -> Option<bool> {
    let state = self.state.lock();
    let value = state.flags.get(feature).copied();
    assert!(
      value.is_some() || !state.active || state.allow_defaults,
      "no override set for feature {feature:?}; override it or allow defaults"
    );
    value
  }

  /// # Panics
  ///
  /// Panics if overrides are active, the param has none and defaults are not allowed.
  #[must_use]
  pub fn param_strict(&self, feature: &str, param: &str) -> Option<String> {
    let state = self.state.lock();
    let value = state
      .params
      .get(feature)
      .and_then(|params| params.get(param))
      .cloned();
    assert!(
      value.is_some() || !state.active || state.allow_defaults,
      "no override set for param {feature:?}:{param:?}; override it or allow defaults"
    );
    value
  }

  fn apply(
    &self,
    flags: Vec<(String, bool)>,
    params: Vec<(String, String, String)>,
    overwrite: bool,
  ) {
    let mut state = self.state.lock();
    state.active = true;

    for (feature, enabled) in flags {
      if overwrite || !state.flags.contains_key(&feature) {
        log::debug!("overriding feature {feature:?} to {enabled}");
        state.flags.insert(feature, enabled);
      }
    }

    for (feature, param, value) in params {
      let params = state.params.entry(feature).or_default();
      if overwrite || !params.contains_key(&param) {
        params.insert(param, value);
      }
    }
  }
}

//
// OverridesBuilder
//

#[must_use]
pub struct OverridesBuilder<'a> {
  overrides: &'a FeatureOverrides,
  flags: Vec<(String, bool)>,
  params: Vec<(String, String, String)>,
}

impl OverridesBuilder<'_> {
  pub fn enable(self, feature: &str) -> Self {
    self.flag(feature, true)
  }

  pub fn disable(self, feature: &str) -> Self {
    self.flag(feature, false)
  }

  pub fn flag(mut self, feature: &str, enabled: bool) -> Self {
    self.flags.push((feature.to_string(), enabled));
    self
  }

  pub fn param(mut self, feature: &str, param: &str, value: impl ToString) -> Self {
    self
      .params
      .push((feature.to_string(), param.to_string(), value.to_string()));
    self
  }

  /// Applies every override, replacing existing overrides for the same keys.
  pub fn apply(self) {
    self.overrides.apply(self.flags, self.params, true);
  }

  /// Applies only the overrides for keys that are not already overridden.
  pub fn apply_without_overwrite(self) {
    self.overrides.apply(self.flags, self.params, false);
  }
}

//
// OverrideNativeOracle
//

/// A native engine stand-in answering from overrides, for environments where the real engine
/// does not exist. Every lookup is strict.
pub struct OverrideNativeOracle {
  overrides: Arc<FeatureOverrides>,
}

impl OverrideNativeOracle {
  #[must_use]
  pub const fn new(overrides: Arc<FeatureOverrides>) -> Self {
    Self { overrides }
  }
}

impl NativeOracle for OverrideNativeOracle {
  fn is_ready(&self) -> bool {
    true
  }

  fn is_enabled_in_native(&self, feature: &str) -> bool {
    self.overrides.flag_strict(feature).unwrap_or(false)
  }

  fn field_trial_param_by_feature(&self, feature: &str, param: &str) -> String {
    self
      .overrides
      .param_strict(feature, param)
      .unwrap_or_default()
  }

  fn field_trial_params_by_feature(&self, feature: &str) -> HashMap<String, String> {
    self
      .overrides
      .params_for_feature(feature)
      .unwrap_or_default()
  }
}
