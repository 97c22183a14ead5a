// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! tolbrep demo command - build a sample model step by step.

use anyhow::{anyhow, Context, Result};
use nalgebra::{Point3, Vector3};
use serde::Serialize;
use tolbrep_topology::{AttributeKind, BlendAttrib, BrepArena, BulletinKind};

use crate::config::Config;
use crate::{Cli, OutputFormat};

#[derive(Serialize)]
struct StateInfo {
    id: u64,
    name: String,
    created: usize,
    deleted: usize,
    changed: usize,
    undone: bool,
}

/// Builds a block, edits it in separate undoable steps and undoes the last
/// one.
fn build(config: &Config) -> Result<BrepArena> {
    let mut arena = BrepArena::with_options(config.modeling.clone());

    let mut tx = arena.begin("block");
    let body = tx.make_block(Point3::origin(), Point3::new(2.0, 1.0, 1.0))?;
    tx.commit();

    let edge = arena
        .body_edges(body)
        .first()
        .copied()
        .ok_or_else(|| anyhow!("block has no edges"))?;
    let t = arena
        .edge_param_range(edge)
        .ok_or_else(|| anyhow!("edge has no parameter range"))?
        .mid();

    let mut tx = arena.begin("tolerant edge");
    tx.make_tolerant_edge(edge, 1e-3, true)?;
    tx.commit();

    let mut tx = arena.begin("split edge");
    let (_, half) = tx.split_edge(edge, t)?;
    tx.add_attribute(half, AttributeKind::Blend(BlendAttrib { radius: 0.1 }))?;
    tx.commit();

    let mut tx = arena.begin("move");
    tx.translate(body, Vector3::new(0.0, 0.0, 5.0))?;
    tx.commit();

    arena.undo()?;
    Ok(arena)
}

pub fn run(output: &str, config: &Config, cli: &Cli) -> Result<()> {
    let arena = build(config)?;
    let history = arena.history();
    let states: Vec<StateInfo> = history
        .states()
        .iter()
        .enumerate()
        .map(|(i, s)| StateInfo {
            id: s.id.0,
            name: s.name.clone(),
            created: s.count(BulletinKind::Create),
            deleted: s.count(BulletinKind::Delete),
            changed: s.count(BulletinKind::Change),
            undone: i >= history.undo_depth(),
        })
        .collect();

    let path = config.output_path(output);
    arena
        .save_sat(&path)
        .with_context(|| format!("Failed to save model to {:?}", path))?;
    tracing::info!(path = %path.display(), entities = arena.entities().len(), "saved demo model");

    if cli.format == OutputFormat::Json {
        return super::print_json(&states);
    }
    println!("Undo log:");
    for s in &states {
        println!(
            "  #{:<3} {:<14} +{:<3} -{:<3} ~{:<3}{}",
            s.id,
            s.name,
            s.created,
            s.deleted,
            s.changed,
            if s.undone { " (undone)" } else { "" }
        );
    }
    println!("{}", arena.check());
    Ok(())
}
