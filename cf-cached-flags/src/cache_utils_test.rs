// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#![allow(clippy::unwrap_used)]

use crate::context::FlagContext;
use crate::flag::CachedFlag;
use crate::keys;
use crate::native::NativeOracle;
use crate::param::{
  AllCachedFieldTrialParameters,
  CachedFieldTrialParameter,
  DoubleCachedFeatureParam,
  IntCachedFeatureParam,
  StringCachedFeatureParam,
};
use crate::value::Value;
use cf_key_value::{InMemoryStorage, Namespace, Store};
use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;

mockall::mock! {
  pub Native {}
  impl NativeOracle for Native {
    fn is_ready(&self) -> bool;
    fn is_enabled_in_native(&self, feature: &str) -> bool;
    fn field_trial_param_by_feature(&self, feature: &str, param: &str) -> String;
    fn field_trial_params_by_feature(&self, feature: &str) -> HashMap<String, String>;
  }
}

struct Setup {
  storage: Arc<InMemoryStorage>,
  store: Store,
  context: Arc<FlagContext>,
}

impl Setup {
  fn new(native: MockNative) -> Self {
    let storage = Arc::new(InMemoryStorage::new());
    let (context, _worker) = FlagContext::builder(storage.clone())
      .native(Arc::new(native))
      .build();

    Self {
      store: Store::new(storage.clone()),
      storage,
      context,
    }
  }

  fn read(&self, key: &str) -> Option<cf_key_value::StoredValue> {
    self.store.read(Namespace::Cached, key)
  }
}

#[test]
fn cache_native_flags_in_one_commit() {
  let mut native = MockNative::new();
  native
    .expect_is_enabled_in_native()
    .with(eq("A"))
    .times(1)
    .return_const(true);
  native
    .expect_is_enabled_in_native()
    .with(eq("B"))
    .times(1)
    .return_const(false);
  let setup = Setup::new(native);

  let a = CachedFlag::new(&setup.context, "A", false);
  let b = CachedFlag::new(&setup.context, "B", true);
  setup.context.cache_utils().cache_native_flags(&[&a, &b]);

  assert_eq!(1, setup.storage.commit_count(Namespace::Cached));
  assert_eq!(Some(Value::Bool(true).to_stored()), setup.read(a.cache_key()));
  assert_eq!(Some(Value::Bool(false).to_stored()), setup.read(b.cache_key()));
}

#[test]
fn cache_nothing_commits_nothing() {
  let setup = Setup::new(MockNative::new());
  let utils = setup.context.cache_utils();
  utils.cache_native_flags(&[]);
  utils.cache_feature_params(&[]);
  utils.cache_native_flags_immediately(&HashMap::new());
  utils.cache_feature_params_immediately(&HashMap::new());
  assert_eq!(0, setup.storage.commit_count(Namespace::Cached));
}

#[test]
fn cache_feature_params_in_one_commit() {
  let mut native = MockNative::new();
  native
    .expect_field_trial_param_by_feature()
    .with(eq("F"), eq("i"))
    .return_const("5".to_string());
  native
    .expect_field_trial_param_by_feature()
    .with(eq("F"), eq("d"))
    .return_const("bogus".to_string());
  native
    .expect_field_trial_param_by_feature()
    .with(eq("F"), eq("s"))
    .return_const("text".to_string());
  native
    .expect_field_trial_params_by_feature()
    .with(eq("G"))
    .return_const(HashMap::from([("k".to_string(), "v".to_string())]));
  let setup = Setup::new(native);

  let i = IntCachedFeatureParam::new(&setup.context, "F", "i", 0);
  let d = DoubleCachedFeatureParam::new(&setup.context, "F", "d", 0.5);
  let s = StringCachedFeatureParam::new(&setup.context, "F", "s", String::new());
  let all = AllCachedFieldTrialParameters::new(&setup.context, "G");
  let params: [&dyn CachedFieldTrialParameter; 4] = [&i, &d, &s, &all];
  setup.context.cache_utils().cache_feature_params(&params);

  assert_eq!(1, setup.storage.commit_count(Namespace::Cached));
  assert_eq!(Some(Value::Int(5).to_stored()), setup.read(i.cache_key()));
  assert_eq!(Some(Value::Double(0.5).to_stored()), setup.read(d.cache_key()));
  assert_eq!(
    Some(Value::String("text".to_string()).to_stored()),
    setup.read(s.cache_key())
  );
  assert_eq!(
    Some(Value::String(r#"{"k":"v"}"#.to_string()).to_stored()),
    setup.read(all.cache_key())
  );
}

#[test]
fn cache_native_flags_immediately() {
  let setup = Setup::new(MockNative::new());
  setup
    .context
    .cache_utils()
    .cache_native_flags_immediately(&HashMap::from([
      ("A".to_string(), true),
      ("B".to_string(), false),
    ]));

  assert_eq!(1, setup.storage.commit_count(Namespace::Cached));
  assert_eq!(
    Some(Value::Bool(true).to_stored()),
    setup.read(&keys::flag_key("A"))
  );
  assert_eq!(
    Some(Value::Bool(false).to_stored()),
    setup.read(&keys::flag_key("B"))
  );
}

#[test]
fn cache_feature_params_immediately_replaces_the_feature_set() {
  let setup = Setup::new(MockNative::new());
  let _count = IntCachedFeatureParam::new(&setup.context, "F", "count", 0);
  let _all = AllCachedFieldTrialParameters::new(&setup.context, "F");
  let utils = setup.context.cache_utils();

  utils.cache_feature_params_immediately(&HashMap::from([(
    "F".to_string(),
    HashMap::from([
      ("count".to_string(), "3".to_string()),
      ("stale".to_string(), "x".to_string()),
    ]),
  )]));
  assert_eq!(
    Some(Value::Int(3).to_stored()),
    setup.read(&keys::param_key("F", "count"))
  );
  assert_eq!(
    Some(Value::String("x".to_string()).to_stored()),
    setup.read(&keys::param_key("F", "stale"))
  );

  utils.cache_feature_params_immediately(&HashMap::from([(
    "F".to_string(),
    HashMap::from([("count".to_string(), "not a number".to_string())]),
  )]));

  // The malformed value is skipped and the dropped param is gone.
  assert_eq!(None, setup.read(&keys::param_key("F", "count")));
  assert_eq!(None, setup.read(&keys::param_key("F", "stale")));
  assert_eq!(
    Some(Value::String(r#"{"count":"not a number"}"#.to_string()).to_stored()),
    setup.read(&keys::all_params_key("F"))
  );
  assert_eq!(2, setup.storage.commit_count(Namespace::Cached));
}

#[test]
fn cache_feature_params_immediately_leaves_other_features() {
  let setup = Setup::new(MockNative::new());
  let utils = setup.context.cache_utils();

  utils.cache_feature_params_immediately(&HashMap::from([
    (
      "A".to_string(),
      HashMap::from([("p".to_string(), "1".to_string())]),
    ),
    (
      "AB".to_string(),
      HashMap::from([("p".to_string(), "2".to_string())]),
    ),
  ]));
  utils.cache_feature_params_immediately(&HashMap::from([(
    "A".to_string(),
    HashMap::new(),
  )]));

  assert_eq!(None, setup.read(&keys::param_key("A", "p")));
  assert_eq!(
    Some(Value::String("2".to_string()).to_stored()),
    setup.read(&keys::param_key("AB", "p"))
  );
  // No all-params declaration, so no blob.
  assert_eq!(None, setup.read(&keys::all_params_key("AB")));
}

#[test]
fn erase() {
  let setup = Setup::new(MockNative::new());
  let a = CachedFlag::new(&setup.context, "A", false);
  let utils = setup.context.cache_utils();
  utils.cache_native_flags_immediately(&HashMap::from([("A".to_string(), true)]));
  utils.cache_feature_params_immediately(&HashMap::from([(
    "F".to_string(),
    HashMap::from([("p".to_string(), "1".to_string())]),
  )]));

  utils.erase_cached_flags(&[&a]);
  utils.erase_feature_params(&["F"]);

  assert_eq!(None, setup.read(a.cache_key()));
  assert_eq!(None, setup.read(&keys::param_key("F", "p")));
}
