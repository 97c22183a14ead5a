// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! tolbrep info command - entity counts and tolerances.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tolbrep_topology::{BrepArena, EntityKey, EntityType};

use crate::config::Config;
use crate::{Cli, OutputFormat};

#[derive(Serialize)]
struct ModelInfo {
    path: String,
    counts: Vec<TypeCount>,
    tolerant: Vec<TolerantInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
}

#[derive(Serialize)]
struct TypeCount {
    kind: String,
    count: usize,
}

#[derive(Serialize)]
struct TolerantInfo {
    kind: String,
    tolerance: Option<f64>,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
}

fn collect(path: &Path, arena: &BrepArena) -> ModelInfo {
    let counts = EntityType::ALL
        .iter()
        .map(|&ty| TypeCount {
            kind: ty.to_string(),
            count: arena.count(ty),
        })
        .filter(|c| c.count > 0)
        .collect();

    let entities = arena.entities();
    let tolerant = entities
        .iter()
        .filter(|&&k| arena.modeling(k).is_some_and(|m| m.is_tolerant()))
        .map(|&k| TolerantInfo {
            kind: k.entity_type().to_string(),
            tolerance: arena.tolerance(k),
        })
        .collect();

    let bounds = entities
        .iter()
        .filter_map(|&k| match k {
            EntityKey::Body(b) => arena.body_box(b),
            _ => None,
        })
        .reduce(|a, b| a.union(&b))
        .map(|b| BoundsInfo {
            min: [b.min.x, b.min.y, b.min.z],
            max: [b.max.x, b.max.y, b.max.z],
        });

    ModelInfo {
        path: path.display().to_string(),
        counts,
        tolerant,
        bounds,
    }
}

pub fn run(input: &Path, config: &Config, cli: &Cli) -> Result<()> {
    let arena = super::load(input, config)?;
    let info = collect(input, &arena);

    if cli.format == OutputFormat::Json {
        return super::print_json(&info);
    }
    println!("{}", info.path);
    for c in &info.counts {
        println!("  {:<8} {}", c.kind, c.count);
    }
    if let Some(b) = &info.bounds {
        println!(
            "  bounds   ({}, {}, {}) .. ({}, {}, {})",
            b.min[0], b.min[1], b.min[2], b.max[0], b.max[1], b.max[2]
        );
    }
    if !info.tolerant.is_empty() {
        println!("  tolerant entities:");
        for t in &info.tolerant {
            match t.tolerance {
                Some(tol) => println!("    {:<8} {:e}", t.kind, tol),
                None => println!("    {:<8} (unknown)", t.kind),
            }
        }
    }
    Ok(())
}
