// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! tolbrep mesh command - triangulate a model to a JSON mesh.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tolbrep_mesh::{Control, MeshInput, Progress, SurfaceSession};
use tolbrep_topology::{BodyKey, BrepArena};

use crate::config::Config;
use crate::{Cli, OutputFormat};

#[derive(Serialize)]
struct MeshSummary {
    output: String,
    nodes: usize,
    triangles: usize,
    segments: usize,
    area: f64,
}

/// Every face and free edge of every body.
fn whole_model(arena: &BrepArena) -> MeshInput {
    arena
        .entities()
        .into_iter()
        .filter_map(|k| BodyKey::try_from(k).ok())
        .fold(MeshInput::new(), |input, body| {
            let part = MeshInput::from_body(arena, body);
            input.with_faces(part.faces).with_edges(part.edges)
        })
}

pub fn run(input: &Path, output: &str, params: &[String], config: &Config, cli: &Cli) -> Result<()> {
    let arena = super::load(input, config)?;
    let mut session = SurfaceSession::new(&arena, whole_model(&arena));

    let pairs = config.mesh_params.iter().cloned().chain(
        params
            .iter()
            .map(|p| {
                p.split_once('=')
                    .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
                    .ok_or_else(|| anyhow!("expected name=value, got {p:?}"))
            })
            .collect::<Result<Vec<_>>>()?,
    );
    for (name, value) in pairs {
        session
            .set_param(&name, &value)
            .with_context(|| format!("Invalid mesh parameter {name}"))?;
    }

    let mut last = 0;
    let mut report = |p: &Progress| {
        let percent = p.percent();
        if percent >= last + 10 {
            last = percent;
            tracing::debug!(percent, "{}", p.message);
        }
        Control::Continue
    };
    let mesh = session.compute(&mut report)?;

    let path = config.output_path(output);
    mesh.save(&path)
        .with_context(|| format!("Failed to save mesh to {:?}", path))?;

    let summary = MeshSummary {
        output: path.display().to_string(),
        nodes: mesh.node_count(),
        triangles: mesh.triangle_count(),
        segments: mesh.segment_count(),
        area: mesh.area(),
    };
    tracing::info!(nodes = summary.nodes, triangles = summary.triangles, "meshed");

    if cli.format == OutputFormat::Json {
        return super::print_json(&summary);
    }
    println!(
        "{}: {} nodes, {} triangles, {} segments, area {:.6}",
        summary.output, summary.nodes, summary.triangles, summary.segments, summary.area
    );
    Ok(())
}
