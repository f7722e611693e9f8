// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

//! Durable, namespaced key-value storage used to cache flag values between process runs.
//!
//! The store exposes typed reads that always succeed (falling back to a caller supplied
//! default) and an [`Editor`] which batches writes so that they become visible atomically when
//! applied.

#![deny(
  clippy::expect_used,
  clippy::panic,
  clippy::todo,
  clippy::unimplemented,
  clippy::unreachable,
  clippy::unwrap_used
)]


pub mod file;
pub mod in_memory;

pub use file::FileStorage;
pub use in_memory::InMemoryStorage;

#[cfg(test)]
#[ctor::ctor]
fn test_global_init() {
  cf_test_helpers::test_global_init();
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

//
// Namespace
//

/// A logically separate key space within the store. Each namespace is committed independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
  /// Values cached from the native configuration engine, plus safe mode bookkeeping.
  Cached,
  /// Values proven safe by a previous clean run.
  SafeValues,
}

impl Namespace {
  pub const ALL: [Self; 2] = [Self::Cached, Self::SafeValues];

  #[must_use]
  pub const fn file_stem(self) -> &'static str {
    match self {
      Self::Cached => "cached_flags",
      Self::SafeValues => "safe_values",
    }
  }
}

//
// StoredValue
//

/// A single persisted value. Doubles have no slot of their own and are stored as the raw bit
/// pattern in a `Long`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
  Bool(bool),
  Int(i32),
  Long(i64),
  String(String),
}

impl StoredValue {
  #[must_use]
  pub const fn type_name(&self) -> &'static str {
    match self {
      Self::Bool(_) => "bool",
      Self::Int(_) => "int",
      Self::Long(_) => "long",
      Self::String(_) => "string",
    }
  }
}

//
// Edit
//

/// A single mutation queued in an [`Editor`].
#[derive(Clone, Debug, PartialEq)]
pub enum Edit {
  Put(String, StoredValue),
  Remove(String),
  RemovePrefix(String),
  Clear,
}

/// Applies a list of edits, in order, to an in-memory map. Shared by the storage backends so
/// that they agree on edit semantics.
pub fn apply_edits(map: &mut HashMap<String, StoredValue>, edits: Vec<Edit>) {
  for edit in edits {
    match edit {
      Edit::Put(key, value) => {
        map.insert(key, value);
      },
      Edit::Remove(key) => {
        map.remove(&key);
      },
      Edit::RemovePrefix(prefix) => map.retain(|key, _| !key.starts_with(&prefix)),
      Edit::Clear => map.clear(),
    }
  }
}

//
// Storage
//

/// A storage backend. Implementations must make each `commit` atomic: either every edit in the
/// batch becomes visible or none of them do.
pub trait Storage: Send + Sync {
  fn get(&self, namespace: Namespace, key: &str) -> anyhow::Result<Option<StoredValue>>;
  fn keys(&self, namespace: Namespace) -> anyhow::Result<Vec<String>>;
  fn commit(&self, namespace: Namespace, edits: Vec<Edit>) -> anyhow::Result<()>;
}

//
// Store
//

/// Typed facade over a [`Storage`] backend. Reads never fail: storage errors and type mismatches
/// are logged and resolved to the supplied default.
#[derive(Clone)]
pub struct Store {
  storage: Arc<dyn Storage>,
}

impl Store {
  #[must_use]
  pub fn new(storage: Arc<dyn Storage>) -> Self {
    Self { storage }
  }

  #[must_use]
  pub fn read(&self, namespace: Namespace, key: &str) -> Option<StoredValue> {
    match self.storage.get(namespace, key) {
      Ok(value) => value,
      Err(e) => {
        log::warn!("failed to read {key:?} from {namespace:?}: {e:?}");
        None
      },
    }
  }

  #[must_use]
  pub fn contains(&self, namespace: Namespace, key: &str) -> bool {
    self.read(namespace, key).is_some()
  }

  #[must_use]
  pub fn read_bool(&self, namespace: Namespace, key: &str, default: bool) -> bool {
    match self.read(namespace, key) {
      Some(StoredValue::Bool(value)) => value,
      other => Self::mismatch(key, "bool", other.as_ref(), default),
    }
  }

  #[must_use]
  pub fn read_int(&self, namespace: Namespace, key: &str, default: i32) -> i32 {
    match self.read(namespace, key) {
      Some(StoredValue::Int(value)) => value,
      other => Self::mismatch(key, "int", other.as_ref(), default),
    }
  }

  #[must_use]
  pub fn read_long(&self, namespace: Namespace, key: &str, default: i64) -> i64 {
    match self.read(namespace, key) {
      Some(StoredValue::Long(value)) => value,
      other => Self::mismatch(key, "long", other.as_ref(), default),
    }
  }

  #[must_use]
  pub fn read_string(&self, namespace: Namespace, key: &str, default: &str) -> String {
    match self.read(namespace, key) {
      Some(StoredValue::String(value)) => value,
      other => Self::mismatch(key, "string", other.as_ref(), default.to_string()),
    }
  }

  fn mismatch<T>(key: &str, expected: &str, found: Option<&StoredValue>, default: T) -> T {
    if let Some(found) = found {
      log::warn!(
        "stored value for {key:?} is a {}, expected {expected}",
        found.type_name()
      );
    }
    default
  }

  #[must_use]
  pub fn keys_with_prefix(&self, namespace: Namespace, prefix: &str) -> Vec<String> {
    match self.storage.keys(namespace) {
      Ok(keys) => keys
        .into_iter()
        .filter(|key| key.starts_with(prefix))
        .collect(),
      Err(e) => {
        log::warn!("failed to list keys in {namespace:?}: {e:?}");
        vec![]
      },
    }
  }

  /// Removes every key in the namespace starting with `prefix` in a single commit.
  pub fn remove_keys_with_prefix(&self, namespace: Namespace, prefix: &str) -> anyhow::Result<()> {
    let mut editor = self.edit(namespace);
    editor.remove_prefix(prefix);
    editor.apply()
  }

  /// Starts a batch of writes against `namespace`.
  #[must_use]
  pub fn edit(&self, namespace: Namespace) -> Editor {
    Editor {
      store: self.clone(),
      namespace,
      edits: vec![],
    }
  }

  /// Commits a previously assembled batch. Used when a batch is built on one thread and applied
  /// on another.
  pub fn commit(&self, namespace: Namespace, edits: Vec<Edit>) -> anyhow::Result<()> {
    if edits.is_empty() {
      return Ok(());
    }
    log::debug!("committing {} edit(s) to {namespace:?}", edits.len());
    self.storage.commit(namespace, edits)
  }
}

//
// Editor
//

/// Accumulates writes against a single namespace. Nothing is visible until [`Editor::apply`].
pub struct Editor {
  store: Store,
  namespace: Namespace,
  edits: Vec<Edit>,
}

impl Editor {
  pub fn put(&mut self, key: impl Into<String>, value: StoredValue) -> &mut Self {
    self.edits.push(Edit::Put(key.into(), value));
    self
  }

  pub fn put_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
    self.put(key, StoredValue::Bool(value))
  }

  pub fn put_int(&mut self, key: impl Into<String>, value: i32) -> &mut Self {
    self.put(key, StoredValue::Int(value))
  }

  pub fn put_long(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
    self.put(key, StoredValue::Long(value))
  }

  pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
    self.put(key, StoredValue::String(value.into()))
  }

  pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
    self.edits.push(Edit::Remove(key.into()));
    self
  }

  pub fn remove_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
    self.edits.push(Edit::RemovePrefix(prefix.into()));
    self
  }

  pub fn clear(&mut self) -> &mut Self {
    self.edits.push(Edit::Clear);
    self
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.edits.is_empty()
  }

  #[must_use]
  pub const fn namespace(&self) -> Namespace {
    self.namespace
  }

  /// Splits the editor into its namespace and queued edits without applying them.
  #[must_use]
  pub fn into_edits(self) -> (Namespace, Vec<Edit>) {
    (self.namespace, self.edits)
  }

  /// Atomically commits every queued edit.
  pub fn apply(self) -> anyhow::Result<()> {
    self.store.commit(self.namespace, self.edits)
  }
}
