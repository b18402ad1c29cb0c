//! CLI configuration resolution.
//!
//! The `--config` argument accepts either an environment name
//! (`dev`/`test`/`prod`) resolved through the standard config directory,
//! or a path to an explicit settings file.

use anyhow::{Context, Result};
use ibd_core::{Config, Environment};
use std::path::Path;

/// Resolve the `--config` argument into a loaded [`Config`].
pub fn resolve(arg: &str) -> Result<(Config, Environment)> {
  if let Ok(environment) = arg.parse::<Environment>() {
    let config = Config::load(environment, None)
      .with_context(|| format!("loading configuration for environment {environment}"))?;
    return Ok((config, environment));
  }

  let environment = Environment::detect();
  let config = Config::load_path(Path::new(arg))
    .with_context(|| format!("loading configuration file {arg}"))?;
  Ok((config, environment))
}
