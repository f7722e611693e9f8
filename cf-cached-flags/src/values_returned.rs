// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./values_returned_test.rs"]
mod values_returned_test;

use crate::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

//
// ValuesReturned
//

/// Remembers the first value returned for every key during a run, so that a flag never changes
/// value while the process is alive.
///
/// Each key owns a `OnceLock` cell. The map lock is only held long enough to find or create the
/// cell, and the supplier runs under the cell's own initialization guard: concurrent first reads
/// of one key wait for a single supplier call, while reads of other keys proceed.
#[derive(Default)]
pub struct ValuesReturned {
  values: Mutex<HashMap<String, Arc<OnceLock<Value>>>>,
}

impl ValuesReturned {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_or_compute(&self, key: &str, supplier: impl FnOnce() -> Value) -> Value {
    let cell = {
      let mut values = self.values.lock();
      if let Some(cell) = values.get(key) {
        cell.clone()
      } else {
        let cell = Arc::new(OnceLock::new());
        values.insert(key.to_string(), cell.clone());
        cell
      }
    };

    cell
      .get_or_init(|| {
        let value = supplier();
        log::debug!("first read of {key:?} resolved to {value}");
        value
      })
      .clone()
  }

  #[must_use]
  pub fn get(&self, key: &str) -> Option<Value> {
    self
      .values
      .lock()
      .get(key)
      .and_then(|cell| cell.get().cloned())
  }

  /// Every value returned so far. Keys still being computed are skipped.
  #[must_use]
  pub fn snapshot(&self) -> Vec<(String, Value)> {
    self
      .values
      .lock()
      .iter()
      .filter_map(|(key, cell)| cell.get().map(|value| (key.clone(), value.clone())))
      .collect()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self
      .values
      .lock()
      .values()
      .filter(|cell| cell.get().is_some())
      .count()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Forgets every value. A run normally lasts as long as the process, so this only exists to
  /// simulate a new run within a test.
  pub fn clear(&self) {
    self.values.lock().clear();
  }
}
