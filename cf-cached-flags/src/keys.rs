// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

// Persisted key names. These are part of the on-disk format and must stay stable across
// releases, otherwise values cached by the previous version are silently lost.

pub const FLAG_PREFIX: &str = "cached_flags.flag.";
pub const PARAM_PREFIX: &str = "cached_flags.param.";
pub const ALL_PARAMS_PREFIX: &str = "cached_flags.all_params.";

/// Number of consecutive runs that started without reaching a clean checkpoint.
pub const CRASH_STREAK_KEY: &str = "cached_flags.safe_mode.crash_streak";

/// Version of the binary that wrote the current set of safe values.
pub const SAFE_VALUES_VERSION_KEY: &str = "cached_flags.safe_mode.safe_values_version";

#[must_use]
pub fn flag_key(feature: &str) -> String {
  format!("{FLAG_PREFIX}{feature}")
}

#[must_use]
pub fn param_key(feature: &str, param: &str) -> String {
  format!("{}{param}", feature_param_prefix(feature))
}

/// Prefix shared by every typed param of `feature`. The trailing separator keeps feature "A"
/// from matching params of feature "AB".
#[must_use]
pub fn feature_param_prefix(feature: &str) -> String {
  format!("{PARAM_PREFIX}{feature}:")
}

#[must_use]
pub fn all_params_key(feature: &str) -> String {
  format!("{ALL_PARAMS_PREFIX}{feature}")
}
