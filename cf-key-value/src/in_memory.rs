// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::{Edit, Namespace, Storage, StoredValue, apply_edits};
use parking_lot::Mutex;
use std::collections::HashMap;

//
// InMemoryStorage
//

/// Process-local storage. Survives as long as the value is alive, which makes it suitable for
/// simulating several process runs over the same store in tests.
#[derive(Default)]
pub struct InMemoryStorage {
  state: Mutex<HashMap<Namespace, HashMap<String, StoredValue>>>,
  commits: Mutex<HashMap<Namespace, usize>>,
}

impl InMemoryStorage {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of commits applied to `namespace` so far.
  #[must_use]
  pub fn commit_count(&self, namespace: Namespace) -> usize {
    self.commits.lock().get(&namespace).copied().unwrap_or_default()
  }

  /// A copy of every entry currently stored in `namespace`.
  #[must_use]
  pub fn entries(&self, namespace: Namespace) -> HashMap<String, StoredValue> {
    self.state.lock().get(&namespace).cloned().unwrap_or_default()
  }
}

impl Storage for InMemoryStorage {
  fn get(&self, namespace: Namespace, key: &str) -> anyhow::Result<Option<StoredValue>> {
    Ok(
      self
        .state
        .lock()
        .get(&namespace)
        .and_then(|values| values.get(key))
        .cloned(),
    )
  }

  fn keys(&self, namespace: Namespace) -> anyhow::Result<Vec<String>> {
    Ok(
      self
        .state
        .lock()
        .get(&namespace)
        .map(|values| values.keys().cloned().collect())
        .unwrap_or_default(),
    )
  }

  fn commit(&self, namespace: Namespace, edits: Vec<Edit>) -> anyhow::Result<()> {
    apply_edits(self.state.lock().entry(namespace).or_default(), edits);
    *self.commits.lock().entry(namespace).or_default() += 1;
    Ok(())
  }
}
