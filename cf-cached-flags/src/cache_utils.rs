// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./cache_utils_test.rs"]
mod cache_utils_test;

use crate::context::FlagContext;
use crate::flag::{CachedFlag, Flag as _};
use crate::keys;
use crate::param::{CachedFieldTrialParameter, encode_params};
use crate::value::Value;
use cf_key_value::{Editor, Namespace};
use std::collections::HashMap;
use std::sync::Arc;

//
// CachedFlagUtils
//

/// Writes values from the native engine into the cache so that the next run can read them
/// before the engine is initialized. Every method commits its writes as one atomic batch.
pub struct CachedFlagUtils {
  context: Arc<FlagContext>,
}

impl CachedFlagUtils {
  #[must_use]
  pub const fn new(context: Arc<FlagContext>) -> Self {
    Self { context }
  }

  /// Caches the current native value of each flag.
  pub fn cache_native_flags(&self, flags: &[&CachedFlag]) {
    let native = self.context.native();
    let mut editor = self.editor();
    for flag in flags {
      editor.put_bool(
        flag.cache_key(),
        native.is_enabled_in_native(flag.feature_name()),
      );
    }
    Self::apply(editor, "flags");
  }

  /// Caches the current native value of each parameter.
  pub fn cache_feature_params(&self, params: &[&dyn CachedFieldTrialParameter]) {
    let native = self.context.native();
    let mut editor = self.editor();
    for param in params {
      param.write_native_value(native, &mut editor);
    }
    Self::apply(editor, "params");
  }

  /// Caches flag values pushed from outside (e.g. a remote config update) without waiting for
  /// the next full caching pass. Keys are feature names.
  pub fn cache_native_flags_immediately(&self, flags: &HashMap<String, bool>) {
    let mut editor = self.editor();
    for (feature, enabled) in flags {
      editor.put_bool(keys::flag_key(feature), *enabled);
    }
    Self::apply(editor, "flags immediately");
  }

  /// Caches the complete parameter set of each feature (feature -> param -> raw value) pushed
  /// from outside.
  ///
  /// Parameters of a feature are a set: everything previously cached for a feature is erased
  /// before its new params are written, so params dropped from the set do not linger. Values of
  /// declared params are stored with their declared type; values that do not parse as that type
  /// are skipped so the declared default applies. Undeclared params are stored as strings.
  pub fn cache_feature_params_immediately(
    &self,
    params: &HashMap<String, HashMap<String, String>>,
  ) {
    let registry = self.context.registry();
    let mut editor = self.editor();

    for (feature, values) in params {
      editor.remove_prefix(keys::feature_param_prefix(feature));

      let all_params_key = keys::all_params_key(feature);
      editor.remove(all_params_key.as_str());
      if registry.contains(&all_params_key)
        && let Some(encoded) = encode_params(values)
      {
        editor.put_string(all_params_key, encoded);
      }

      for (param, raw) in values {
        let key = keys::param_key(feature, param);
        let value = match registry.value_type(&key) {
          Some(value_type) => match Value::parse(value_type, raw) {
            Ok(value) => value,
            Err(e) => {
              log::warn!("not caching {key:?}: {e}");
              continue;
            },
          },
          None => Value::String(raw.clone()),
        };
        editor.put(key, value.to_stored());
      }
    }

    Self::apply(editor, "params immediately");
  }

  /// Removes the cached values of the given flags.
  pub fn erase_cached_flags(&self, flags: &[&CachedFlag]) {
    let mut editor = self.editor();
    for flag in flags {
      editor.remove(flag.cache_key());
    }
    Self::apply(editor, "flag erasure");
  }

  /// Removes every cached parameter of the given features.
  pub fn erase_feature_params(&self, features: &[&str]) {
    let mut editor = self.editor();
    for feature in features {
      editor
        .remove_prefix(keys::feature_param_prefix(feature))
        .remove(keys::all_params_key(feature));
    }
    Self::apply(editor, "param erasure");
  }

  fn editor(&self) -> Editor {
    self.context.store().edit(Namespace::Cached)
  }

  fn apply(editor: Editor, what: &str) {
    if editor.is_empty() {
      return;
    }
    match editor.apply() {
      Ok(()) => log::debug!("cached native {what}"),
      Err(e) => log::warn!("failed to cache native {what}: {e:?}"),
    }
  }
}
