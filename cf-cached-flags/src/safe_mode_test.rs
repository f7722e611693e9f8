// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#![allow(clippy::unwrap_used)]

use crate::config::SafeModeConfig;
use crate::keys::{CRASH_STREAK_KEY, SAFE_VALUES_VERSION_KEY};
use crate::persistence::PersistenceWorker;
use crate::safe_mode::{CachedFlagsSafeMode, SafeModeBehavior};
use crate::value::Value;
use crate::values_returned::ValuesReturned;
use cf_key_value::{InMemoryStorage, Namespace, Store};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::collections::HashMap;
use std::sync::Arc;

struct Setup {
  storage: Arc<InMemoryStorage>,
  store: Store,
}

impl Setup {
  fn new() -> Self {
    let storage = Arc::new(InMemoryStorage::new());
    let store = Store::new(storage.clone());
    Self { storage, store }
  }

  // Without a running worker queued writes are committed inline, keeping these tests
  // synchronous.
  fn safe_mode(&self, version: &str) -> (CachedFlagsSafeMode, Arc<ValuesReturned>) {
    let values_returned = Arc::new(ValuesReturned::new());
    let (persistence, _worker) = PersistenceWorker::new(self.store.clone());
    let safe_mode = CachedFlagsSafeMode::new(
      self.store.clone(),
      SafeModeConfig {
        crash_streak_threshold: 2,
        version: version.to_string(),
      },
      values_returned.clone(),
      persistence,
    );
    (safe_mode, values_returned)
  }

  fn set_streak(&self, streak: i32) {
    let mut editor = self.store.edit(Namespace::Cached);
    editor.put_int(CRASH_STREAK_KEY, streak);
    editor.apply().unwrap();
  }

  fn streak(&self) -> i32 {
    self.store.read_int(Namespace::Cached, CRASH_STREAK_KEY, 0)
  }
}

#[test]
fn behavior_is_lazy() {
  let setup = Setup::new();
  let (safe_mode, _) = setup.safe_mode("1.0");

  assert_eq!(SafeModeBehavior::Uninitialized, safe_mode.current_behavior());
  assert!(!safe_mode.has_flag_been_checked());

  safe_mode.on_flag_checked();
  assert!(safe_mode.has_flag_been_checked());
  assert_eq!(
    SafeModeBehavior::NotEngagedBelowThreshold,
    safe_mode.current_behavior()
  );
}

#[rstest]
#[case(0, SafeModeBehavior::NotEngagedBelowThreshold)]
#[case(1, SafeModeBehavior::NotEngagedBelowThreshold)]
#[case(2, SafeModeBehavior::EngagedWithoutSafeValues)]
#[case(5, SafeModeBehavior::EngagedWithoutSafeValues)]
fn threshold(#[case] streak: i32, #[case] expected: SafeModeBehavior) {
  let setup = Setup::new();
  setup.set_streak(streak);
  let (safe_mode, _) = setup.safe_mode("1.0");
  assert_eq!(expected, safe_mode.behavior());
}

#[test]
fn behavior_uses_streak_from_previous_runs() {
  let setup = Setup::new();
  setup.set_streak(1);
  let (safe_mode, _) = setup.safe_mode("1.0");

  safe_mode.on_start_or_resume_checkpoint();
  assert_eq!(2, setup.streak());
  assert_eq!(
    SafeModeBehavior::NotEngagedBelowThreshold,
    safe_mode.current_behavior()
  );
}

#[test]
fn start_is_persisted_synchronously() {
  let setup = Setup::new();
  let (safe_mode, _) = setup.safe_mode("1.0");

  safe_mode.on_start_or_resume_checkpoint();
  assert_eq!(1, setup.streak());
  assert_eq!(1, setup.storage.commit_count(Namespace::Cached));
}

#[test]
fn repeated_checkpoints_are_idempotent() {
  let setup = Setup::new();
  let (safe_mode, _) = setup.safe_mode("1.0");

  safe_mode.on_start_or_resume_checkpoint();
  safe_mode.on_start_or_resume_checkpoint();
  assert_eq!(1, setup.streak());

  safe_mode.on_pause_checkpoint();
  safe_mode.on_pause_checkpoint();
  assert_eq!(0, setup.streak());
}

#[test]
fn start_pause_cycles_net_to_one_increment() {
  let setup = Setup::new();
  setup.set_streak(1);
  let (safe_mode, _) = setup.safe_mode("1.0");

  safe_mode.on_start_or_resume_checkpoint();
  safe_mode.on_pause_checkpoint();
  safe_mode.on_start_or_resume_checkpoint();
  safe_mode.on_pause_checkpoint();
  safe_mode.on_start_or_resume_checkpoint();
  assert_eq!(2, setup.streak());
}

#[test]
fn pause_without_start_is_ignored() {
  let setup = Setup::new();
  let (safe_mode, _) = setup.safe_mode("1.0");

  safe_mode.on_pause_checkpoint();
  assert_eq!(0, setup.streak());
  assert_eq!(0, setup.storage.commit_count(Namespace::Cached));
}

#[test]
fn end_resets_streak_and_records_safe_values() {
  let setup = Setup::new();
  setup.set_streak(1);
  let (safe_mode, values_returned) = setup.safe_mode("1.0");

  safe_mode.on_start_or_resume_checkpoint();
  values_returned.get_or_compute("flag", || Value::Bool(true));
  values_returned.get_or_compute("ratio", || Value::Double(0.25));
  safe_mode.on_end_checkpoint();

  assert_eq!(0, setup.streak());
  assert_eq!(
    HashMap::from([
      (
        SAFE_VALUES_VERSION_KEY.to_string(),
        Value::String("1.0".to_string()).to_stored()
      ),
      ("flag".to_string(), Value::Bool(true).to_stored()),
      ("ratio".to_string(), Value::Double(0.25).to_stored()),
    ]),
    setup.storage.entries(Namespace::SafeValues)
  );

  // Ended runs ignore further checkpoints.
  safe_mode.on_start_or_resume_checkpoint();
  safe_mode.on_end_checkpoint();
  assert_eq!(0, setup.streak());
  assert_eq!(1, setup.storage.commit_count(Namespace::SafeValues));
}

#[test]
fn end_replaces_previous_safe_values() {
  let setup = Setup::new();

  let (safe_mode, values_returned) = setup.safe_mode("1.0");
  values_returned.get_or_compute("old", || Value::Int(1));
  safe_mode.on_end_checkpoint();

  let (safe_mode, values_returned) = setup.safe_mode("1.0");
  values_returned.get_or_compute("new", || Value::Int(2));
  safe_mode.on_end_checkpoint();

  assert!(!setup.store.contains(Namespace::SafeValues, "old"));
  assert_eq!(2, setup.store.read_int(Namespace::SafeValues, "new", 0));
}

#[test]
fn engaged_with_safe_values() {
  let setup = Setup::new();
  let (safe_mode, values_returned) = setup.safe_mode("1.0");
  values_returned.get_or_compute("flag", || Value::Bool(true));
  values_returned.get_or_compute("count", || Value::Int(3));
  values_returned.get_or_compute("ratio", || Value::Double(0.5));
  values_returned.get_or_compute("name", || Value::String("x".to_string()));
  safe_mode.on_end_checkpoint();

  setup.set_streak(2);
  let (safe_mode, _) = setup.safe_mode("1.0");
  assert_eq!(SafeModeBehavior::EngagedWithSafeValues, safe_mode.behavior());
  assert_eq!(Some(true), safe_mode.safe_bool("flag"));
  assert_eq!(Some(3), safe_mode.safe_int("count"));
  assert_eq!(Some(0.5), safe_mode.safe_double("ratio"));
  assert_eq!(Some("x".to_string()), safe_mode.safe_string("name"));

  // Type mismatches and missing keys have no safe value.
  assert_eq!(None, safe_mode.safe_int("flag"));
  assert_eq!(None, safe_mode.safe_bool("missing"));

  assert_eq!(Some(true), safe_mode.resolve("flag", &false));
  assert_eq!(Some(9), safe_mode.resolve("missing", &9));
}

#[test]
fn outdated_safe_values_are_ignored() {
  let setup = Setup::new();
  let (safe_mode, values_returned) = setup.safe_mode("1.0");
  values_returned.get_or_compute("flag", || Value::Bool(true));
  safe_mode.on_end_checkpoint();

  setup.set_streak(2);
  let (safe_mode, _) = setup.safe_mode("2.0");
  assert_eq!(
    SafeModeBehavior::EngagedIgnoringOutdatedSafeValues,
    safe_mode.behavior()
  );
  assert_eq!(None, safe_mode.safe_bool("flag"));
  assert_eq!(Some(false), safe_mode.resolve("flag", &false));
}

#[test]
fn not_engaged_resolves_to_none() {
  let setup = Setup::new();
  let (safe_mode, _) = setup.safe_mode("1.0");
  assert_eq!(None, safe_mode.resolve("flag", &true));
}

#[test]
fn engaged_without_safe_values_resolves_to_default() {
  let setup = Setup::new();
  setup.set_streak(3);
  let (safe_mode, _) = setup.safe_mode("1.0");
  assert_eq!(
    SafeModeBehavior::EngagedWithoutSafeValues,
    safe_mode.behavior()
  );
  assert!(
    !setup
      .store
      .contains(Namespace::SafeValues, SAFE_VALUES_VERSION_KEY)
  );
  assert_eq!(
    Some("d".to_string()),
    safe_mode.resolve("name", &"d".to_string())
  );
}
