// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./param_test.rs"]
mod param_test;

use crate::context::FlagContext;
use crate::keys;
use crate::native::NativeOracle;
use crate::registry::Declaration;
use crate::value::{ParamValue, ValueType};
use cf_key_value::Editor;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

//
// CachedFieldTrialParameter
//

/// Type-erased view of a cached parameter, used to cache a heterogeneous list of parameters in
/// one batch.
pub trait CachedFieldTrialParameter: Send + Sync {
  fn feature_name(&self) -> &str;

  fn cache_key(&self) -> &str;

  /// Queues the native engine's current value for this parameter into `editor`.
  fn write_native_value(&self, native: &dyn NativeOracle, editor: &mut Editor);
}

//
// CachedFeatureParam
//

/// A typed field trial parameter of a feature, cached like a [`crate::flag::CachedFlag`].
pub struct CachedFeatureParam<T: ParamValue> {
  context: Arc<FlagContext>,
  feature: String,
  param: String,
  key: String,
  default: T,
}

pub type BooleanCachedFeatureParam = CachedFeatureParam<bool>;
pub type IntCachedFeatureParam = CachedFeatureParam<i32>;
pub type DoubleCachedFeatureParam = CachedFeatureParam<f64>;
pub type StringCachedFeatureParam = CachedFeatureParam<String>;

impl<T: ParamValue> CachedFeatureParam<T> {
  /// # Panics
  ///
  /// Panics if `param` of `feature` was already declared against `context`.
  #[must_use]
  pub fn new(context: &Arc<FlagContext>, feature: &str, param: &str, default: T) -> Self {
    let key = keys::param_key(feature, param);
    context.registry().register(
      &key,
      Declaration {
        feature: feature.to_string(),
        param: Some(param.to_string()),
        value_type: T::TYPE,
      },
    );

    Self {
      context: context.clone(),
      feature: feature.to_string(),
      param: param.to_string(),
      key,
      default,
    }
  }

  /// # Panics
  ///
  /// Panics if an override is set for this parameter that does not parse as `T`.
  #[must_use]
  pub fn value(&self) -> T {
    if let Some(raw) = self.context.overrides().param(&self.feature, &self.param) {
      return T::parse(&raw).unwrap_or_else(|e| {
        panic!(
          "invalid override for {}:{}: {e}",
          self.feature, self.param
        )
      });
    }

    self.context.read_cached(&self.key, &self.default)
  }

  #[must_use]
  pub const fn default_value(&self) -> &T {
    &self.default
  }

  #[must_use]
  pub fn param_name(&self) -> &str {
    &self.param
  }
}

impl<T: ParamValue> CachedFieldTrialParameter for CachedFeatureParam<T> {
  fn feature_name(&self) -> &str {
    &self.feature
  }

  fn cache_key(&self) -> &str {
    &self.key
  }

  fn write_native_value(&self, native: &dyn NativeOracle, editor: &mut Editor) {
    let value = T::from_native(native, &self.feature, &self.param, &self.default);
    editor.put(self.key.as_str(), value.into_value().to_stored());
  }
}

//
// AllCachedFieldTrialParameters
//

/// Every parameter of a feature, cached together as a single JSON object. Useful when the set of
/// parameter names is not known ahead of time.
pub struct AllCachedFieldTrialParameters {
  context: Arc<FlagContext>,
  feature: String,
  key: String,
}

impl AllCachedFieldTrialParameters {
  /// # Panics
  ///
  /// Panics if all parameters of `feature` were already declared against `context`.
  #[must_use]
  pub fn new(context: &Arc<FlagContext>, feature: &str) -> Self {
    let key = keys::all_params_key(feature);
    context.registry().register(
      &key,
      Declaration {
        feature: feature.to_string(),
        param: None,
        value_type: ValueType::String,
      },
    );

    Self {
      context: context.clone(),
      feature: feature.to_string(),
      key,
    }
  }

  #[must_use]
  pub fn params(&self) -> HashMap<String, String> {
    if let Some(params) = self.context.overrides().params_for_feature(&self.feature) {
      return params;
    }

    decode_params(&self.context.read_cached(&self.key, &String::new()))
  }
}

impl CachedFieldTrialParameter for AllCachedFieldTrialParameters {
  fn feature_name(&self) -> &str {
    &self.feature
  }

  fn cache_key(&self) -> &str {
    &self.key
  }

  fn write_native_value(&self, native: &dyn NativeOracle, editor: &mut Editor) {
    if let Some(encoded) = encode_params(&native.field_trial_params_by_feature(&self.feature)) {
      editor.put_string(self.key.as_str(), encoded);
    }
  }
}

pub(crate) fn encode_params(params: &HashMap<String, String>) -> Option<String> {
  // Sorted so that the same params always produce the same string.
  let sorted: BTreeMap<_, _> = params.iter().collect();
  match serde_json::to_string(&sorted) {
    Ok(encoded) => Some(encoded),
    Err(e) => {
      log::warn!("failed to encode params: {e}");
      None
    },
  }
}

fn decode_params(encoded: &str) -> HashMap<String, String> {
  if encoded.is_empty() {
    return HashMap::new();
  }

  serde_json::from_str(encoded).unwrap_or_else(|e| {
    log::warn!("discarding malformed cached params {encoded:?}: {e}");
    HashMap::new()
  })
}
