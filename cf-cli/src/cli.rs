// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(clap::ValueEnum, Copy, Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// Reach the end checkpoint
  Clean,
  /// Reach the pause checkpoint
  Pause,
  /// Exit without any further checkpoint
  Crash,
}

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Options {
  /// Directory holding the persisted store
  #[clap(
    env = "CACHED_FLAGS_DIR",
    long,
    required = false,
    default_value = ".cached-flags"
  )]
  pub dir: PathBuf,

  /// YAML flags config
  #[clap(env = "CACHED_FLAGS_CONFIG", long)]
  pub config: Option<PathBuf>,

  /// Version of the simulated binary, overriding the config
  #[clap(long)]
  pub app_version: Option<String>,

  /// Command to run
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Print the crash streak, the safe mode behavior the next run would get and the stored values
  Status,

  /// Simulate one process run
  Run(RunCommand),

  /// Cache the manifest's native values without a run
  CacheImmediately(ManifestArgs),

  /// Remove every cached value declared by the manifest
  Erase(ManifestArgs),
}

#[derive(Args, Debug)]
pub struct ManifestArgs {
  /// YAML manifest of declarations and native values
  #[clap(long)]
  pub manifest: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunCommand {
  #[command(flatten)]
  pub manifest: ManifestArgs,

  /// How the run ends
  #[clap(long, required = false, default_value = "clean")]
  pub outcome: Outcome,

  /// Skip caching the manifest's native values during the run
  #[clap(long)]
  pub no_cache: bool,
}
