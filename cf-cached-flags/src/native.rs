// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use std::collections::HashMap;

//
// NativeOracle
//

/// The authoritative configuration engine. It only knows the real flag state once it has been
/// initialized, which happens well after the first flags are read during startup.
///
/// Params that are not set are reported as the empty string, and the typed accessors fall back
/// to the supplied default for missing or unparseable values.
pub trait NativeOracle: Send + Sync {
  /// Whether the engine has finished initializing.
  fn is_ready(&self) -> bool;

  fn is_enabled_in_native(&self, feature: &str) -> bool;

  fn field_trial_param_by_feature(&self, feature: &str, param: &str) -> String;

  /// Every param currently set for `feature`.
  fn field_trial_params_by_feature(&self, feature: &str) -> HashMap<String, String>;

  fn field_trial_param_by_feature_as_boolean(
    &self,
    feature: &str,
    param: &str,
    default: bool,
  ) -> bool {
    match self.field_trial_param_by_feature(feature, param).as_str() {
      "true" => true,
      "false" => false,
      _ => default,
    }
  }

  fn field_trial_param_by_feature_as_int(&self, feature: &str, param: &str, default: i32) -> i32 {
    self
      .field_trial_param_by_feature(feature, param)
      .parse()
      .unwrap_or(default)
  }

  fn field_trial_param_by_feature_as_double(
    &self,
    feature: &str,
    param: &str,
    default: f64,
  ) -> f64 {
    self
      .field_trial_param_by_feature(feature, param)
      .parse()
      .unwrap_or(default)
  }
}

//
// UnavailableNativeOracle
//

/// Used when no native engine is wired up: never ready and reports nothing.
#[derive(Default)]
pub struct UnavailableNativeOracle;

impl NativeOracle for UnavailableNativeOracle {
  fn is_ready(&self) -> bool {
    false
  }

  fn is_enabled_in_native(&self, _feature: &str) -> bool {
    false
  }

  fn field_trial_param_by_feature(&self, _feature: &str, _param: &str) -> String {
    String::new()
  }

  fn field_trial_params_by_feature(&self, _feature: &str) -> HashMap<String, String> {
    HashMap::new()
  }
}
