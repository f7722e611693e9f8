// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use std::sync::Once;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

const DEFAULT_TEST_FILTER: &str = "debug";

/// Installs test logging and the panic hook. Safe to call from every test binary's ctor; only the
/// first call has any effect.
pub fn test_global_init() {
  static INIT: Once = Once::new();
  INIT.call_once(|| {
    install_panic_logger();
    init_logging();
  });
}

fn init_logging() {
  let stderr = tracing_subscriber::fmt::layer()
    .with_test_writer()
    .with_line_number(true)
    .with_thread_ids(true)
    .compact();

  let filter = EnvFilter::new(
    std::env::var("RUST_LOG")
      .as_deref()
      .unwrap_or(DEFAULT_TEST_FILTER),
  );

  // Another harness may already own the global subscriber, in which case we keep theirs.
  let _ignored = Registry::default().with(filter).with(stderr).try_init();
}

// Logs every panic on a single line before deferring to the previous hook, so expected panics
// in tests show up next to the surrounding log output.
fn install_panic_logger() {
  let previous = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    let payload = info.payload();
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
      *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
      message.as_str()
    } else {
      "<none>"
    };
    let location = info.location().map_or_else(
      || "<none>".to_string(),
      |location| format!("{}:{}", location.file(), location.line()),
    );

    log::error!("panic: message=\"{message}\" location={location}");
    previous(info);
  }));
}
