// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./file_test.rs"]
mod file_test;

use crate::{Edit, Namespace, Storage, StoredValue, apply_edits};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

type Entries = HashMap<String, StoredValue>;

//
// FileStorage
//

/// Storage backed by one JSON file per namespace inside a directory.
///
/// Every namespace is loaded into memory on open so reads never touch the disk. A commit writes
/// the complete updated namespace to a temporary file in the same directory and renames it over
/// the previous file, so a crash mid-commit leaves either the old or the new contents behind.
/// Commits are serialized by their own lock; reads only wait for the in-memory swap, never for
/// disk I/O.
pub struct FileStorage {
  directory: PathBuf,
  state: Mutex<HashMap<Namespace, Entries>>,
  commit_lock: Mutex<()>,
}

impl FileStorage {
  /// Opens (creating if needed) the storage directory. Files that cannot be parsed are treated as
  /// empty and will be replaced on the next commit to that namespace.
  pub fn open(directory: impl AsRef<Path>) -> anyhow::Result<Self> {
    let directory = directory.as_ref().to_path_buf();
    std::fs::create_dir_all(&directory)?;

    let mut state = HashMap::new();
    for namespace in Namespace::ALL {
      state.insert(namespace, Self::load(&Self::file_path(&directory, namespace)));
    }

    log::debug!("opened file storage at {}", directory.display());
    Ok(Self {
      directory,
      state: Mutex::new(state),
      commit_lock: Mutex::new(()),
    })
  }

  #[must_use]
  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn file_path(directory: &Path, namespace: Namespace) -> PathBuf {
    directory.join(format!("{}.json", namespace.file_stem()))
  }

  fn load(path: &Path) -> Entries {
    let data = match std::fs::read(path) {
      Ok(data) => data,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Entries::new(),
      Err(e) => {
        log::warn!("failed to read {}: {e}", path.display());
        return Entries::new();
      },
    };

    serde_json::from_slice(&data).unwrap_or_else(|e| {
      log::warn!("discarding unparseable store file {}: {e}", path.display());
      Entries::new()
    })
  }

  fn persist(&self, namespace: Namespace, entries: &Entries) -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new_in(&self.directory)?;
    serde_json::to_writer(&mut file, entries)?;
    file.flush()?;
    file.as_file().sync_all()?;
    file.persist(Self::file_path(&self.directory, namespace))?;
    Ok(())
  }
}

impl Storage for FileStorage {
  fn get(&self, namespace: Namespace, key: &str) -> anyhow::Result<Option<StoredValue>> {
    Ok(
      self
        .state
        .lock()
        .get(&namespace)
        .and_then(|entries| entries.get(key))
        .cloned(),
    )
  }

  fn keys(&self, namespace: Namespace) -> anyhow::Result<Vec<String>> {
    Ok(
      self
        .state
        .lock()
        .get(&namespace)
        .map(|entries| entries.keys().cloned().collect())
        .unwrap_or_default(),
    )
  }

  fn commit(&self, namespace: Namespace, edits: Vec<Edit>) -> anyhow::Result<()> {
    let _commit = self.commit_lock.lock();
    let mut updated = self
      .state
      .lock()
      .get(&namespace)
      .cloned()
      .unwrap_or_default();
    apply_edits(&mut updated, edits);

    self.persist(namespace, &updated)?;
    self.state.lock().insert(namespace, updated);
    Ok(())
  }
}
