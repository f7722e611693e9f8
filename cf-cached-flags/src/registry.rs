// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./registry_test.rs"]
mod registry_test;

use crate::value::ValueType;
use parking_lot::Mutex;
use std::collections::HashMap;

//
// Declaration
//

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
  pub feature: String,
  pub param: Option<String>,
  pub value_type: ValueType,
}

//
// Registry
//

/// Every flag and parameter declared against a context, keyed by its cache key.
#[derive(Default)]
pub struct Registry {
  declarations: Mutex<HashMap<String, Declaration>>,
}

impl Registry {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Records a declaration.
  ///
  /// # Panics
  ///
  /// Declaring the same key twice is a programming error and panics. The check and the insert
  /// happen under one lock, so of two racing declarations exactly one panics.
  pub fn register(&self, key: &str, declaration: Declaration) {
    let mut declarations = self.declarations.lock();
    assert!(
      !declarations.contains_key(key),
      "duplicate declaration for {key:?} ({declaration:?})"
    );
    log::trace!("registered {key:?}");
    declarations.insert(key.to_string(), declaration);
  }

  #[must_use]
  pub fn contains(&self, key: &str) -> bool {
    self.declarations.lock().contains_key(key)
  }

  #[must_use]
  pub fn value_type(&self, key: &str) -> Option<ValueType> {
    self
      .declarations
      .lock()
      .get(key)
      .map(|declaration| declaration.value_type)
  }

  #[must_use]
  pub fn declarations(&self) -> Vec<(String, Declaration)> {
    self
      .declarations
      .lock()
      .iter()
      .map(|(key, declaration)| (key.clone(), declaration.clone()))
      .collect()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.declarations.lock().len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
