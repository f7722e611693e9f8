// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::cli::{Command, Options, Outcome, RunCommand};
use crate::manifest::Manifest;
use cf_cached_flags::keys::SAFE_VALUES_VERSION_KEY;
use cf_cached_flags::{FlagContext, FlagsConfig, OverrideNativeOracle};
use cf_key_value::{FileStorage, Namespace, Store};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

mod cli;
mod manifest;

#[cfg(test)]
#[ctor::ctor]
fn test_global_init() {
  cf_test_helpers::test_global_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  init_tracing();
  let args = Options::parse();

  let mut config = match &args.config {
    Some(path) => FlagsConfig::from_yaml_file(path)?,
    None => FlagsConfig::default(),
  };
  if let Some(version) = &args.app_version {
    config = config.with_version(version.as_str());
  }

  let storage = Arc::new(FileStorage::open(&args.dir)?);

  match args.command {
    Command::Status => {
      let (context, _worker) = FlagContext::builder(storage).config(config).build();
      print_status(&context);
    },
    Command::Run(cmd) => run(storage, config, &cmd).await?,
    Command::CacheImmediately(cmd) => {
      let manifest = Manifest::from_yaml_file(&cmd.manifest)?;
      let (context, _worker) = FlagContext::builder(storage).config(config).build();
      // Declaring first lets params be stored with their declared types.
      let _declarations = manifest.declare(&context)?;
      let utils = context.cache_utils();
      utils.cache_native_flags_immediately(&manifest.native.flags);
      utils.cache_feature_params_immediately(&manifest.native.params);
      eprintln!(
        "cached {} flag(s) and params of {} feature(s)",
        manifest.native.flags.len(),
        manifest.native.params.len()
      );
    },
    Command::Erase(cmd) => {
      let manifest = Manifest::from_yaml_file(&cmd.manifest)?;
      let (context, _worker) = FlagContext::builder(storage).config(config).build();
      let declarations = manifest.declare(&context)?;
      let utils = context.cache_utils();
      utils.erase_cached_flags(&declarations.flag_refs());
      utils.erase_feature_params(&declarations.param_features());
    },
  }

  Ok(())
}

async fn run(
  storage: Arc<FileStorage>,
  config: FlagsConfig,
  cmd: &RunCommand,
) -> anyhow::Result<()> {
  let manifest = Manifest::from_yaml_file(&cmd.manifest.manifest)?;

  let mut builder = FlagContext::builder(storage)
    .config(config)
    .native(Arc::new(OverrideNativeOracle::new(
      manifest.native.to_overrides(),
    )));
  if !manifest.overrides.is_empty() {
    builder = builder.overrides(manifest.overrides.to_overrides());
  }
  let (context, worker) = builder.build();
  let worker = tokio::spawn(worker.run());

  let declarations = manifest.declare(&context)?;
  context.safe_mode().on_start_or_resume_checkpoint();
  eprintln!(
    "safe mode: {:?} (crash streak now {})",
    context.safe_mode().current_behavior(),
    context.safe_mode().crash_streak()
  );

  for (name, value) in declarations.read_all() {
    println!("{name:<40} {value}");
  }

  if !cmd.no_cache {
    let utils = context.cache_utils();
    utils.cache_native_flags(&declarations.flag_refs());
    utils.cache_feature_params(&declarations.param_refs());
  }

  match cmd.outcome {
    Outcome::Clean => context.safe_mode().on_end_checkpoint(),
    Outcome::Pause => context.safe_mode().on_pause_checkpoint(),
    Outcome::Crash => {},
  }

  context.flush_persistence().await;
  worker.abort();
  Ok(())
}

fn print_status(context: &FlagContext) {
  let safe_mode = context.safe_mode();
  eprintln!("crash streak: {}", safe_mode.crash_streak());
  eprintln!("next run: {:?}", safe_mode.behavior());

  let store = context.store();
  eprintln!(
    "safe values version: {:?}",
    store.read_string(Namespace::SafeValues, SAFE_VALUES_VERSION_KEY, "")
  );

  for namespace in Namespace::ALL {
    print_namespace(store, namespace);
  }
}

fn print_namespace(store: &Store, namespace: Namespace) {
  let mut keys = store.keys_with_prefix(namespace, "");
  keys.sort();
  println!("[{namespace:?}]");
  for key in keys {
    if let Some(value) = store.read(namespace, &key) {
      println!("  {key:<50} {value:?}");
    }
  }
}

fn init_tracing() {
  let stderr = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_ansi(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .compact();

  let filter = EnvFilter::new(std::env::var("RUST_LOG").as_deref().unwrap_or("info"));

  Registry::default().with(filter).with(stderr).init();
}
