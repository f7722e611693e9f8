// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#![allow(clippy::unwrap_used)]

use crate::context::FlagContext;
use crate::keys;
use crate::overrides::FeatureOverrides;
use crate::param::{
  AllCachedFieldTrialParameters,
  BooleanCachedFeatureParam,
  CachedFieldTrialParameter,
  DoubleCachedFeatureParam,
  IntCachedFeatureParam,
  StringCachedFeatureParam,
  decode_params,
  encode_params,
};
use crate::test::FakeNativeOracle;
use crate::value::Value;
use cf_key_value::{InMemoryStorage, Namespace, Store};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;

struct Setup {
  store: Store,
  native: Arc<FakeNativeOracle>,
  overrides: Arc<FeatureOverrides>,
  context: Arc<FlagContext>,
}

impl Setup {
  fn new() -> Self {
    let storage = Arc::new(InMemoryStorage::new());
    let native = Arc::new(FakeNativeOracle::new());
    let overrides = Arc::new(FeatureOverrides::new());
    let (context, _worker) = FlagContext::builder(storage.clone())
      .native(native.clone())
      .overrides(overrides.clone())
      .build();

    Self {
      store: Store::new(storage),
      native,
      overrides,
      context,
    }
  }

  fn cache(&self, key: &str, value: Value) {
    let mut editor = self.store.edit(Namespace::Cached);
    editor.put(key, value.to_stored());
    editor.apply().unwrap();
  }
}

#[test]
fn typed_params_read_cached_values() {
  let setup = Setup::new();
  setup.cache(&keys::param_key("F", "b"), Value::Bool(true));
  setup.cache(&keys::param_key("F", "i"), Value::Int(-4));
  setup.cache(&keys::param_key("F", "d"), Value::Double(2.5));
  setup.cache(&keys::param_key("F", "s"), Value::String("cached".to_string()));

  let b = BooleanCachedFeatureParam::new(&setup.context, "F", "b", false);
  let i = IntCachedFeatureParam::new(&setup.context, "F", "i", 1);
  let d = DoubleCachedFeatureParam::new(&setup.context, "F", "d", 1.0);
  let s = StringCachedFeatureParam::new(&setup.context, "F", "s", "default".to_string());

  assert!(b.value());
  assert_eq!(-4, i.value());
  assert_eq!(2.5, d.value());
  assert_eq!("cached", s.value());
  assert_eq!("cached_flags.param.F:i", i.cache_key());
  assert_eq!("i", i.param_name());
  assert_eq!(&1, i.default_value());
}

#[test]
fn uncached_params_return_defaults() {
  let setup = Setup::new();
  let i = IntCachedFeatureParam::new(&setup.context, "F", "i", 7);
  let s = StringCachedFeatureParam::new(&setup.context, "F", "s", "default".to_string());
  assert_eq!(7, i.value());
  assert_eq!("default", s.value());
}

#[test]
fn cached_value_of_wrong_type_returns_default() {
  let setup = Setup::new();
  setup.cache(&keys::param_key("F", "i"), Value::String("3".to_string()));
  let i = IntCachedFeatureParam::new(&setup.context, "F", "i", 7);
  assert_eq!(7, i.value());
}

#[test]
fn override_is_parsed() {
  let setup = Setup::new();
  setup.cache(&keys::param_key("F", "d"), Value::Double(2.5));
  let d = DoubleCachedFeatureParam::new(&setup.context, "F", "d", 1.0);

  setup.overrides.override_param("F", "d", 0.75);
  assert_eq!(0.75, d.value());
}

#[test]
#[should_panic(expected = "invalid override for F:i")]
fn malformed_override_panics() {
  let setup = Setup::new();
  let i = IntCachedFeatureParam::new(&setup.context, "F", "i", 7);
  setup.overrides.override_param("F", "i", "seven");
  let _ignored = i.value();
}

#[test]
fn params_of_one_feature_are_independent() {
  let setup = Setup::new();
  let _a = IntCachedFeatureParam::new(&setup.context, "F", "a", 0);
  let _b = IntCachedFeatureParam::new(&setup.context, "F", "b", 0);
  let _c = IntCachedFeatureParam::new(&setup.context, "G", "a", 0);
  assert_eq!(3, setup.context.registry().len());
}

#[test]
#[should_panic(expected = "duplicate declaration")]
fn duplicate_param_panics() {
  let setup = Setup::new();
  let _first = IntCachedFeatureParam::new(&setup.context, "F", "a", 0);
  let _second = BooleanCachedFeatureParam::new(&setup.context, "F", "a", false);
}

#[test]
fn write_native_value() {
  let setup = Setup::new();
  setup.native.set_param("F", "i", "12");
  setup.native.set_param("F", "d", "not a number");

  let i = IntCachedFeatureParam::new(&setup.context, "F", "i", 1);
  let d = DoubleCachedFeatureParam::new(&setup.context, "F", "d", 1.5);
  let s = StringCachedFeatureParam::new(&setup.context, "F", "s", "fallback".to_string());

  let mut editor = setup.store.edit(Namespace::Cached);
  i.write_native_value(setup.native.as_ref(), &mut editor);
  d.write_native_value(setup.native.as_ref(), &mut editor);
  s.write_native_value(setup.native.as_ref(), &mut editor);
  editor.apply().unwrap();

  assert_eq!(
    12,
    setup
      .store
      .read_int(Namespace::Cached, &keys::param_key("F", "i"), 0)
  );
  assert_eq!(
    Some(Value::Double(1.5).to_stored()),
    setup.store.read(Namespace::Cached, &keys::param_key("F", "d"))
  );
  assert_eq!(
    "fallback",
    setup
      .store
      .read_string(Namespace::Cached, &keys::param_key("F", "s"), "")
  );
}

#[test]
fn all_params() {
  let setup = Setup::new();
  setup.native.set_param("F", "b", "2");
  setup.native.set_param("F", "a", "1");
  let all = AllCachedFieldTrialParameters::new(&setup.context, "F");
  assert_eq!("cached_flags.all_params.F", all.cache_key());

  let mut editor = setup.store.edit(Namespace::Cached);
  all.write_native_value(setup.native.as_ref(), &mut editor);
  editor.apply().unwrap();

  assert_eq!(
    r#"{"a":"1","b":"2"}"#,
    setup
      .store
      .read_string(Namespace::Cached, all.cache_key(), "")
  );
  assert_eq!(
    HashMap::from([
      ("a".to_string(), "1".to_string()),
      ("b".to_string(), "2".to_string()),
    ]),
    all.params()
  );
}

#[test]
fn all_params_prefers_overrides() {
  let setup = Setup::new();
  setup.cache(
    &keys::all_params_key("F"),
    Value::String(r#"{"a":"1"}"#.to_string()),
  );
  let all = AllCachedFieldTrialParameters::new(&setup.context, "F");

  setup.overrides.override_param("F", "z", "9");
  assert_eq!(
    HashMap::from([("z".to_string(), "9".to_string())]),
    all.params()
  );
}

#[test]
fn malformed_params_blob_decodes_to_empty() {
  assert!(decode_params("").is_empty());
  assert!(decode_params("not json").is_empty());
  assert_eq!(
    Some(r#"{"x":"1","y":"2"}"#.to_string()),
    encode_params(&HashMap::from([
      ("y".to_string(), "2".to_string()),
      ("x".to_string(), "1".to_string()),
    ]))
  );
}
