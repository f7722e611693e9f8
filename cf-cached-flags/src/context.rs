// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::cache_utils::CachedFlagUtils;
use crate::config::FlagsConfig;
use crate::native::{NativeOracle, UnavailableNativeOracle};
use crate::overrides::FeatureOverrides;
use crate::persistence::{PersistenceHandle, PersistenceWorker};
use crate::registry::Registry;
use crate::safe_mode::CachedFlagsSafeMode;
use crate::value::{ParamValue, Value};
use crate::values_returned::ValuesReturned;
use cf_key_value::{Namespace, Storage, Store};
use std::sync::Arc;

//
// FlagContext
//

/// Holds all state shared by the flags of one process run: the store, the declaration registry,
/// the returned-value memo, overrides and the safe mode controller. Construct one at startup and
/// hand it to every declaration.
pub struct FlagContext {
  config: FlagsConfig,
  store: Store,
  registry: Registry,
  values_returned: Arc<ValuesReturned>,
  overrides: Arc<FeatureOverrides>,
  safe_mode: CachedFlagsSafeMode,
  native: Arc<dyn NativeOracle>,
  persistence: PersistenceHandle,
}

impl FlagContext {
  #[must_use]
  pub fn builder(storage: Arc<dyn Storage>) -> FlagContextBuilder {
    FlagContextBuilder {
      storage,
      config: FlagsConfig::default(),
      native: None,
      overrides: None,
    }
  }

  #[must_use]
  pub const fn config(&self) -> &FlagsConfig {
    &self.config
  }

  #[must_use]
  pub const fn store(&self) -> &Store {
    &self.store
  }

  #[must_use]
  pub const fn registry(&self) -> &Registry {
    &self.registry
  }

  #[must_use]
  pub fn values_returned(&self) -> &ValuesReturned {
    &self.values_returned
  }

  #[must_use]
  pub const fn overrides(&self) -> &Arc<FeatureOverrides> {
    &self.overrides
  }

  #[must_use]
  pub const fn safe_mode(&self) -> &CachedFlagsSafeMode {
    &self.safe_mode
  }

  #[must_use]
  pub fn native(&self) -> &dyn NativeOracle {
    self.native.as_ref()
  }

  #[must_use]
  pub fn cache_utils(self: &Arc<Self>) -> CachedFlagUtils {
    CachedFlagUtils::new(self.clone())
  }

  /// Waits until every background write queued so far has been committed.
  pub async fn flush_persistence(&self) {
    self.persistence.flush().await;
  }

  /// Resolves a cached value: memoized value, else safe mode, else the cached native value,
  /// else `default`. Overrides are handled by the callers since their lookup key differs per
  /// declaration type.
  pub(crate) fn read_cached<T: ParamValue>(&self, key: &str, default: &T) -> T {
    self.safe_mode.on_flag_checked();

    let value = self.values_returned.get_or_compute(key, || {
      self
        .safe_mode
        .resolve(key, default)
        .unwrap_or_else(|| self.read_persisted(key, default))
        .into_value()
    });

    T::from_value(&value).unwrap_or_else(|| {
      log::warn!("memoized value {value} for {key:?} is not a {:?}", T::TYPE);
      default.clone()
    })
  }

  fn read_persisted<T: ParamValue>(&self, key: &str, default: &T) -> T {
    self
      .store
      .read(Namespace::Cached, key)
      .and_then(|stored| Value::from_stored(T::TYPE, &stored))
      .and_then(|value| T::from_value(&value))
      .unwrap_or_else(|| default.clone())
  }
}

//
// FlagContextBuilder
//

#[must_use]
pub struct FlagContextBuilder {
  storage: Arc<dyn Storage>,
  config: FlagsConfig,
  native: Option<Arc<dyn NativeOracle>>,
  overrides: Option<Arc<FeatureOverrides>>,
}

impl FlagContextBuilder {
  pub fn config(mut self, config: FlagsConfig) -> Self {
    self.config = config;
    self
  }

  pub fn native(mut self, native: Arc<dyn NativeOracle>) -> Self {
    self.native = Some(native);
    self
  }

  pub fn overrides(mut self, overrides: Arc<FeatureOverrides>) -> Self {
    self.overrides = Some(overrides);
    self
  }

  /// Builds the context. The returned worker applies background writes and must be spawned,
  /// e.g. `tokio::spawn(worker.run())`.
  ///
  /// Dropping the worker makes background writes happen inline on the calling thread. Keeping it
  /// without running it leaves them queued: the safe values recorded by the end checkpoint are
  /// then lost at exit and `flush_persistence` never resolves. The first write queued in that
  /// state logs a warning.
  pub fn build(self) -> (Arc<FlagContext>, PersistenceWorker) {
    let store = Store::new(self.storage);
    let (persistence, worker) = PersistenceWorker::new(store.clone());
    let values_returned = Arc::new(ValuesReturned::new());
    let safe_mode = CachedFlagsSafeMode::new(
      store.clone(),
      self.config.safe_mode.clone(),
      values_returned.clone(),
      persistence.clone(),
    );

    log::debug!(
      "creating flag context for version {:?}",
      self.config.safe_mode.version
    );

    let context = Arc::new(FlagContext {
      config: self.config,
      store,
      registry: Registry::new(),
      values_returned,
      overrides: self.overrides.unwrap_or_default(),
      safe_mode,
      native: self
        .native
        .unwrap_or_else(|| Arc::new(UnavailableNativeOracle)),
      persistence,
    });

    (context, worker)
  }
}
