// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./manifest_test.rs"]
mod manifest_test;

use cf_cached_flags::{
  AllCachedFieldTrialParameters,
  BooleanCachedFeatureParam,
  CachedFeatureParam,
  CachedFieldTrialParameter,
  CachedFlag,
  DoubleCachedFeatureParam,
  FeatureOverrides,
  Flag as _,
  FlagContext,
  IntCachedFeatureParam,
  ParamValue,
  StringCachedFeatureParam,
};
use anyhow::bail;
use cf_cached_flags::keys;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

//
// Manifest
//

/// Describes the flags a simulated process declares, plus the state of the native engine and
/// any overrides. For example:
///
/// ```yaml
/// flags:
///   - feature: MyFeature
///     default: false
/// params:
///   - feature: MyFeature
///     param: count
///     type: int
///     default: "3"
/// all_params:
///   - MyFeature
/// native:
///   flags:
///     MyFeature: true
///   params:
///     MyFeature:
///       count: "5"
/// ```
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
  pub flags: Vec<FlagEntry>,
  pub params: Vec<ParamEntry>,
  pub all_params: Vec<String>,
  pub native: FlagSnapshot,
  pub overrides: FlagSnapshot,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FlagEntry {
  pub feature: String,
  #[serde(default)]
  pub default: bool,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ParamEntry {
  pub feature: String,
  pub param: String,
  #[serde(rename = "type")]
  pub param_type: ParamType,
  pub default: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
  Bool,
  Int,
  Double,
  String,
}

/// Flag and param values keyed by feature name.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FlagSnapshot {
  pub flags: HashMap<String, bool>,
  pub params: HashMap<String, HashMap<String, String>>,
}

impl FlagSnapshot {
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.flags.is_empty() && self.params.is_empty()
  }

  /// Loads the snapshot into a fresh set of overrides. Keys missing from the snapshot resolve to
  /// defaults rather than panicking.
  #[must_use]
  pub fn to_overrides(&self) -> Arc<FeatureOverrides> {
    let overrides = Arc::new(FeatureOverrides::new());
    let mut builder = overrides.builder();
    for (feature, enabled) in &self.flags {
      builder = builder.flag(feature, *enabled);
    }
    for (feature, params) in &self.params {
      for (param, value) in params {
        builder = builder.param(feature, param, value);
      }
    }
    builder.apply();
    overrides.set_allow_defaults(true);
    overrides
  }
}

impl Manifest {
  pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
    Ok(serde_yaml::from_str(yaml)?)
  }

  pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
    log::debug!("loading manifest from {}", path.display());
    Self::from_yaml_str(&std::fs::read_to_string(path)?)
  }

  /// Declares everything in the manifest against `context`. Fails without declaring anything if
  /// the manifest lists a flag or param twice, or one already declared against `context`.
  pub fn declare(&self, context: &Arc<FlagContext>) -> anyhow::Result<Declarations> {
    self.check_unique(context)?;

    let flags = self
      .flags
      .iter()
      .map(|flag| CachedFlag::new(context, &flag.feature, flag.default))
      .collect();

    let params = self
      .params
      .iter()
      .map(|param| param.declare(context))
      .collect::<anyhow::Result<_>>()?;

    let all_params = self
      .all_params
      .iter()
      .map(|feature| AllCachedFieldTrialParameters::new(context, feature))
      .collect();

    Ok(Declarations {
      flags,
      params,
      all_params,
    })
  }

  fn check_unique(&self, context: &FlagContext) -> anyhow::Result<()> {
    let keys = self
      .flags
      .iter()
      .map(|flag| keys::flag_key(&flag.feature))
      .chain(
        self
          .params
          .iter()
          .map(|param| keys::param_key(&param.feature, &param.param)),
      )
      .chain(self.all_params.iter().map(|feature| keys::all_params_key(feature)));

    let mut seen = HashSet::new();
    for key in keys {
      if context.registry().contains(&key) || !seen.insert(key.clone()) {
        bail!("{key:?} is declared more than once");
      }
    }
    Ok(())
  }
}

impl ParamEntry {
  fn declare(&self, context: &Arc<FlagContext>) -> anyhow::Result<DeclaredParam> {
    fn typed<T: ParamValue>(
      context: &Arc<FlagContext>,
      entry: &ParamEntry,
    ) -> anyhow::Result<CachedFeatureParam<T>> {
      let default = T::parse(&entry.default)?;
      Ok(CachedFeatureParam::new(
        context,
        &entry.feature,
        &entry.param,
        default,
      ))
    }

    Ok(match self.param_type {
      ParamType::Bool => DeclaredParam::Bool(typed(context, self)?),
      ParamType::Int => DeclaredParam::Int(typed(context, self)?),
      ParamType::Double => DeclaredParam::Double(typed(context, self)?),
      ParamType::String => DeclaredParam::String(typed(context, self)?),
    })
  }
}

//
// Declarations
//

pub enum DeclaredParam {
  Bool(BooleanCachedFeatureParam),
  Int(IntCachedFeatureParam),
  Double(DoubleCachedFeatureParam),
  String(StringCachedFeatureParam),
}

impl DeclaredParam {
  fn as_dyn(&self) -> &dyn CachedFieldTrialParameter {
    match self {
      Self::Bool(param) => param,
      Self::Int(param) => param,
      Self::Double(param) => param,
      Self::String(param) => param,
    }
  }

  fn read(&self) -> String {
    match self {
      Self::Bool(param) => param.value().to_string(),
      Self::Int(param) => param.value().to_string(),
      Self::Double(param) => param.value().to_string(),
      Self::String(param) => format!("{:?}", param.value()),
    }
  }
}

/// Everything a manifest declared against one context.
pub struct Declarations {
  pub flags: Vec<CachedFlag>,
  pub params: Vec<DeclaredParam>,
  pub all_params: Vec<AllCachedFieldTrialParameters>,
}

impl Declarations {
  /// Reads every declaration, returning `(name, value)` pairs in declaration order.
  #[must_use]
  pub fn read_all(&self) -> Vec<(String, String)> {
    let flags = self
      .flags
      .iter()
      .map(|flag| (flag.feature_name().to_string(), flag.is_enabled().to_string()));

    let params = self.params.iter().map(|param| {
      let param_dyn = param.as_dyn();
      (param_dyn.cache_key().to_string(), param.read())
    });

    let all_params = self.all_params.iter().map(|all| {
      let mut params: Vec<_> = all.params().into_iter().collect();
      params.sort();
      (all.feature_name().to_string(), format!("{params:?}"))
    });

    flags.chain(params).chain(all_params).collect()
  }

  #[must_use]
  pub fn flag_refs(&self) -> Vec<&CachedFlag> {
    self.flags.iter().collect()
  }

  #[must_use]
  pub fn param_refs(&self) -> Vec<&dyn CachedFieldTrialParameter> {
    self
      .params
      .iter()
      .map(DeclaredParam::as_dyn)
      .chain(
        self
          .all_params
          .iter()
          .map(|all| all as &dyn CachedFieldTrialParameter),
      )
      .collect()
  }

  /// Every feature that has params declared.
  #[must_use]
  pub fn param_features(&self) -> Vec<&str> {
    let mut features: Vec<&str> = self
      .params
      .iter()
      .map(|param| param.as_dyn().feature_name())
      .chain(self.all_params.iter().map(|all| all.feature_name()))
      .collect();
    features.sort_unstable();
    features.dedup();
    features
  }
}
