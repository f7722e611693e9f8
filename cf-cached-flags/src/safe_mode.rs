// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

//! Crash loop protection for cached flag values.
//!
//! Values cached from the native engine are only applied on the next run, so a bad value can
//! crash every startup before the app ever gets a chance to fetch a fixed configuration. To
//! break such loops we count runs which start but never reach a clean checkpoint. Once that
//! streak reaches the configured threshold, the next run ignores the native cache and uses the
//! values recorded at the end of the last clean run ("safe values"), or the declared defaults if
//! no usable safe values exist.
//!
//! The host drives the controller through three checkpoints:
//! - [`CachedFlagsSafeMode::on_start_or_resume_checkpoint`] when a run starts or resumes. The
//!   streak is incremented and persisted immediately so that a crash right after still counts.
//! - [`CachedFlagsSafeMode::on_pause_checkpoint`] when a run is interrupted without crashing.
//!   The increment is undone.
//! - [`CachedFlagsSafeMode::on_end_checkpoint`] once the run is known to be healthy. The streak
//!   is reset and every value returned during this run becomes the new set of safe values.

#[cfg(test)]
#[path = "./safe_mode_test.rs"]
mod safe_mode_test;

use crate::config::SafeModeConfig;
use crate::keys::{CRASH_STREAK_KEY, SAFE_VALUES_VERSION_KEY};
use crate::persistence::PersistenceHandle;
use crate::value::{ParamValue, Value};
use crate::values_returned::ValuesReturned;
use cf_key_value::{Namespace, Store};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

//
// SafeModeBehavior
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SafeModeBehavior {
  /// Not determined yet; no flag has been checked and no start checkpoint reached.
  Uninitialized,
  NotEngagedBelowThreshold,
  EngagedWithSafeValues,
  EngagedWithoutSafeValues,
  EngagedIgnoringOutdatedSafeValues,
}

impl SafeModeBehavior {
  #[must_use]
  pub const fn is_engaged(self) -> bool {
    matches!(
      self,
      Self::EngagedWithSafeValues
        | Self::EngagedWithoutSafeValues
        | Self::EngagedIgnoringOutdatedSafeValues
    )
  }
}

// Where the current run is in its checkpoint lifecycle. Checkpoints may be reported more than
// once or out of order; the phase makes every transition idempotent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunPhase {
  Idle,
  Started,
  Paused,
  Ended,
}

struct State {
  behavior: SafeModeBehavior,
  phase: RunPhase,
}

//
// CachedFlagsSafeMode
//

pub struct CachedFlagsSafeMode {
  store: Store,
  config: SafeModeConfig,
  values_returned: Arc<ValuesReturned>,
  persistence: PersistenceHandle,
  state: Mutex<State>,
  flag_checked: AtomicBool,
}

impl CachedFlagsSafeMode {
  #[must_use]
  pub fn new(
    store: Store,
    config: SafeModeConfig,
    values_returned: Arc<ValuesReturned>,
    persistence: PersistenceHandle,
  ) -> Self {
    Self {
      store,
      config,
      values_returned,
      persistence,
      state: Mutex::new(State {
        behavior: SafeModeBehavior::Uninitialized,
        phase: RunPhase::Idle,
      }),
      flag_checked: AtomicBool::new(false),
    }
  }

  /// The behavior for this run, determining it if nothing has done so yet.
  #[must_use]
  pub fn behavior(&self) -> SafeModeBehavior {
    let mut state = self.state.lock();
    self.determine_behavior(&mut state)
  }

  /// The behavior as determined so far, without triggering determination.
  #[must_use]
  pub fn current_behavior(&self) -> SafeModeBehavior {
    self.state.lock().behavior
  }

  /// The persisted crash streak.
  #[must_use]
  pub fn crash_streak(&self) -> i32 {
    self.store.read_int(Namespace::Cached, CRASH_STREAK_KEY, 0)
  }

  #[must_use]
  pub fn has_flag_been_checked(&self) -> bool {
    self.flag_checked.load(Ordering::Relaxed)
  }

  /// Called on every read of a cached value, before it is resolved.
  pub fn on_flag_checked(&self) {
    if !self.flag_checked.swap(true, Ordering::Relaxed) {
      log::trace!("first cached flag checked");
    }
    let _behavior = self.behavior();
  }

  pub fn on_start_or_resume_checkpoint(&self) {
    let mut state = self.state.lock();
    // The behavior must be based on the streak left by previous runs, so determine it before
    // this run's increment lands.
    self.determine_behavior(&mut state);

    match state.phase {
      RunPhase::Idle | RunPhase::Paused => {
        let streak = self.crash_streak().saturating_add(1);
        self.write_crash_streak(streak);
        state.phase = RunPhase::Started;
        log::debug!("start checkpoint reached, crash streak is now {streak}");
      },
      RunPhase::Started | RunPhase::Ended => {
        log::debug!("ignoring start checkpoint in phase {:?}", state.phase);
      },
    }
  }

  pub fn on_pause_checkpoint(&self) {
    let mut state = self.state.lock();
    if state.phase != RunPhase::Started {
      log::debug!("ignoring pause checkpoint in phase {:?}", state.phase);
      return;
    }

    let streak = (self.crash_streak() - 1).max(0);
    self.write_crash_streak(streak);
    state.phase = RunPhase::Paused;
    log::debug!("pause checkpoint reached, crash streak is now {streak}");
  }

  /// Marks the run as clean. The crash streak is reset synchronously; the values returned during
  /// this run are written as the new safe values in the background.
  pub fn on_end_checkpoint(&self) {
    let mut state = self.state.lock();
    if state.phase == RunPhase::Ended {
      log::debug!("ignoring repeated end checkpoint");
      return;
    }
    self.determine_behavior(&mut state);
    state.phase = RunPhase::Ended;
    drop(state);

    self.write_crash_streak(0);

    let values = self.values_returned.snapshot();
    log::debug!(
      "end checkpoint reached, recording {} safe value(s) for version {:?}",
      values.len(),
      self.config.version
    );

    // Safe values always form one complete set from a single run, so the previous set is
    // dropped in the same batch.
    let mut editor = self.store.edit(Namespace::SafeValues);
    editor.clear();
    for (key, value) in values {
      editor.put(key, value.to_stored());
    }
    editor.put_string(SAFE_VALUES_VERSION_KEY, self.config.version.as_str());

    let (namespace, edits) = editor.into_edits();
    self.persistence.commit(namespace, edits);
  }

  /// The safe value recorded for `key`, if safe mode is engaged with usable safe values and the
  /// key has one.
  #[must_use]
  pub fn safe_value<T: ParamValue>(&self, key: &str) -> Option<T> {
    if self.behavior() != SafeModeBehavior::EngagedWithSafeValues {
      return None;
    }

    let stored = self.store.read(Namespace::SafeValues, key)?;
    let value = Value::from_stored(T::TYPE, &stored);
    if value.is_none() {
      log::warn!("safe value for {key:?} has unexpected type {}", stored.type_name());
    }
    value.as_ref().and_then(T::from_value)
  }

  #[must_use]
  pub fn safe_bool(&self, key: &str) -> Option<bool> {
    self.safe_value(key)
  }

  #[must_use]
  pub fn safe_int(&self, key: &str) -> Option<i32> {
    self.safe_value(key)
  }

  #[must_use]
  pub fn safe_double(&self, key: &str) -> Option<f64> {
    self.safe_value(key)
  }

  #[must_use]
  pub fn safe_string(&self, key: &str) -> Option<String> {
    self.safe_value(key)
  }

  /// Resolves `key` when safe mode is engaged: the safe value if usable, otherwise the default.
  /// Returns `None` when safe mode is not engaged, meaning the regular cached value applies.
  #[must_use]
  pub fn resolve<T: ParamValue>(&self, key: &str, default: &T) -> Option<T> {
    match self.behavior() {
      SafeModeBehavior::Uninitialized | SafeModeBehavior::NotEngagedBelowThreshold => None,
      SafeModeBehavior::EngagedWithSafeValues => {
        Some(self.safe_value(key).unwrap_or_else(|| default.clone()))
      },
      SafeModeBehavior::EngagedWithoutSafeValues
      | SafeModeBehavior::EngagedIgnoringOutdatedSafeValues => Some(default.clone()),
    }
  }

  fn determine_behavior(&self, state: &mut State) -> SafeModeBehavior {
    if state.behavior != SafeModeBehavior::Uninitialized {
      return state.behavior;
    }

    let streak = u32::try_from(self.crash_streak()).unwrap_or(0);
    state.behavior = if streak < self.config.crash_streak_threshold {
      SafeModeBehavior::NotEngagedBelowThreshold
    } else {
      let safe_version = self
        .store
        .read_string(Namespace::SafeValues, SAFE_VALUES_VERSION_KEY, "");
      if safe_version.is_empty() {
        SafeModeBehavior::EngagedWithoutSafeValues
      } else if safe_version == self.config.version {
        SafeModeBehavior::EngagedWithSafeValues
      } else {
        SafeModeBehavior::EngagedIgnoringOutdatedSafeValues
      }
    };

    if state.behavior.is_engaged() {
      log::warn!(
        "safe mode engaged after {streak} crash(es): {:?}",
        state.behavior
      );
    } else {
      log::info!("safe mode not engaged, crash streak {streak}");
    }

    state.behavior
  }

  fn write_crash_streak(&self, streak: i32) {
    let mut editor = self.store.edit(Namespace::Cached);
    editor.put_int(CRASH_STREAK_KEY, streak);
    if let Err(e) = editor.apply() {
      log::warn!("failed to persist crash streak {streak}: {e:?}");
    }
  }
}
