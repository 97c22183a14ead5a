// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! tolbrep check command - report topology defects.

use std::path::Path;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::{Cli, OutputFormat};

pub fn run(input: &Path, config: &Config, cli: &Cli) -> Result<()> {
    let arena = super::load(input, config)?;
    let report = arena.check();
    tracing::info!(
        entities = report.entities,
        issues = report.issues.len(),
        "checked {}",
        input.display()
    );

    match cli.format {
        OutputFormat::Json => super::print_json(&report)?,
        OutputFormat::Text => print!("{report}"),
    }
    if !report.is_valid() {
        bail!("{} has {} issue(s)", input.display(), report.issues.len());
    }
    Ok(())
}
