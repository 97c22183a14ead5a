// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod check;
pub mod demo;
pub mod info;
pub mod mesh;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tolbrep_topology::BrepArena;

use crate::config::Config;

/// Loads a model with the configured resolutions.
pub fn load(input: &Path, config: &Config) -> Result<BrepArena> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read model from {:?}", input))?;
    BrepArena::from_sat_with_options(&text, config.modeling.clone())
        .with_context(|| format!("Failed to restore model from {:?}", input))
}

/// Prints a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
