// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local topology edits: splitting an edge, merging vertices and stitching
//! edges together.
//!
//! Each edit keeps partner rings, loop chains and use counts consistent and
//! runs the attribute hooks of the entities it splits or merges. Repairs that
//! close a gap larger than `resabs` leave a healing attribute behind.

use crate::attribute::{AttributeKind, HealingAttrib};
use crate::entity::{CoedgeData, Modeling, NEEDS_UPDATE};
use crate::error::{Error, Result};
use crate::geometry::Interval;
use crate::keys::*;
use crate::transaction::Transaction;

impl Transaction<'_> {
    /// Splits an edge at curve parameter `t`.
    ///
    /// The original edge keeps the part from its start vertex to the new
    /// vertex; the returned edge runs from the new vertex to the old end.
    /// Every coedge is split in the same way and the new coedge takes its
    /// place in the same loop or wire.
    pub fn split_edge(&mut self, edge: EdgeKey, t: f64) -> Result<(VertexKey, EdgeKey)> {
        let data = self.edge(edge).ok_or(Error::NotFound(edge.into()))?.clone();
        let (Some(curve_key), Some(start), Some(end)) = (data.curve, data.start, data.end) else {
            return Err(Error::UnboundedEdge(edge.into()));
        };
        let range = self
            .edge_param_range(edge)
            .ok_or(Error::UnboundedEdge(edge.into()))?;
        if !range.strictly_contains(t, self.resabs()) {
            return Err(Error::ParameterOutOfRange(t));
        }
        let point = self
            .edge_curve(edge)
            .ok_or(Error::UnboundedEdge(edge.into()))?
            .point(t);

        let (kept_range, new_range, along) = if data.sense.is_reversed() {
            (
                Interval::new(t, range.end),
                Interval::new(range.start, t),
                (range.end - t) / range.length(),
            )
        } else {
            (
                Interval::new(range.start, t),
                Interval::new(t, range.end),
                (t - range.start) / range.length(),
            )
        };

        let vertex = self.make_vertex(point)?;
        let new_edge = self.make_edge(Some(vertex), Some(end), Some(curve_key), data.sense)?;
        self.set_edge_vertices(edge, Some(start), Some(vertex))?;
        {
            let e = self.edge_mut(edge)?;
            e.param_range = Some(kept_range);
        }
        {
            let e = self.edge_mut(new_edge)?;
            e.param_range = Some(new_range);
            e.convexity = data.convexity;
            e.modeling = data.modeling;
        }
        if data.modeling.is_tolerant() {
            self.make_tolerant_vertex(vertex, NEEDS_UPDATE)?;
        }

        for c in self.edge_coedges(edge) {
            self.split_coedge(c, new_edge, along)?;
        }
        self.split_attributes(edge.into(), new_edge.into())?;
        tracing::debug!(?edge, ?new_edge, t, "split edge");
        Ok((vertex, new_edge))
    }

    /// Creates the coedge on `new_edge` that takes over part of `coedge`, and
    /// links it next to the original in the owner's chain.
    fn split_coedge(&mut self, coedge: CoedgeKey, new_edge: EdgeKey, along: f64) -> Result<CoedgeKey> {
        let data: CoedgeData = self.coedge(coedge).ok_or(Error::NotFound(coedge.into()))?.clone();
        let reversed = data.sense.is_reversed();

        // Pcurves run with the coedge; a reversed coedge meets the new part
        // of the edge first.
        let (kept_pcurve, new_pcurve) = match self.coedge_pcurve(coedge) {
            Some(p) => {
                let f = if reversed { 1.0 - along } else { along };
                let (first, second) = p.split_at(f);
                if reversed {
                    (Some(second), Some(first))
                } else {
                    (Some(first), Some(second))
                }
            }
            None => (None, None),
        };
        let new_pcurve = match new_pcurve {
            Some(p) => Some(self.make_pcurve(p.points)?),
            None => None,
        };
        if let Some(p) = kept_pcurve {
            let key = self.make_pcurve(p.points)?;
            self.set_coedge_pcurve(coedge, Some(key))?;
        }

        let new = self.make_coedge(new_edge, data.sense, new_pcurve)?;
        {
            let n = self.coedge_mut(new)?;
            n.owner = data.owner;
            n.modeling = data.modeling;
        }
        if reversed {
            // previous -> new -> coedge
            let previous = data.previous;
            self.coedge_mut(new)?.previous = previous;
            self.coedge_mut(new)?.next = Some(coedge);
            self.coedge_mut(coedge)?.previous = Some(new);
            if let Some(p) = previous {
                self.coedge_mut(p)?.next = Some(new);
            }
        } else {
            // coedge -> new -> next
            let next = data.next;
            self.coedge_mut(new)?.next = next;
            self.coedge_mut(new)?.previous = Some(coedge);
            self.coedge_mut(coedge)?.next = Some(new);
            if let Some(n) = next {
                self.coedge_mut(n)?.previous = Some(new);
            }
        }
        if data.modeling.is_tolerant() {
            self.mark_tolerance_stale(coedge.into())?;
            self.mark_tolerance_stale(new.into())?;
        }
        self.split_attributes(coedge.into(), new.into())?;
        Ok(new)
    }

    /// Merges `absorb` into `keep`: every edge ending at `absorb` is moved to
    /// `keep` and `absorb` is lost.
    ///
    /// The two vertices must be coincident. A gap above `resabs` makes `keep`
    /// tolerant and is recorded in a healing attribute.
    pub fn merge_vertices(&mut self, keep: VertexKey, absorb: VertexKey) -> Result<()> {
        if keep == absorb {
            return Ok(());
        }
        let distance = self
            .point_set_distance(keep, absorb)
            .ok_or(Error::NotFound(absorb.into()))?;
        if !self.coincident(keep, absorb) {
            let tolerance = self
                .tolerance(keep.into())
                .unwrap_or(0.0)
                .max(self.tolerance(absorb.into()).unwrap_or(0.0))
                .max(self.resabs());
            return Err(Error::NotCoincident { distance, tolerance });
        }
        self.absorb_vertex(keep, absorb, distance)
    }

    fn absorb_vertex(&mut self, keep: VertexKey, absorb: VertexKey, gap: f64) -> Result<()> {
        if keep == absorb {
            return Ok(());
        }
        if gap > self.resabs() {
            let original = self.modeling(keep.into()).and_then(|m| m.stored_tolerance());
            let tolerance = original.unwrap_or(0.0).max(gap);
            self.set_vertex_modeling(keep, Modeling::Tolerant { tolerance })?;
            self.add_attribute(
                keep,
                AttributeKind::Healing(HealingAttrib {
                    gap,
                    original_tolerance: original,
                    note: "merged vertices".into(),
                }),
            )?;
        }
        self.merge_attributes(keep.into(), absorb.into())?;

        let edges = self.vertex_edges(absorb).to_vec();
        if edges.is_empty() {
            return self.lose(absorb);
        }
        for e in edges {
            let d = self.edge(e).ok_or(Error::NotFound(e.into()))?;
            let swap = |v: Option<VertexKey>| if v == Some(absorb) { Some(keep) } else { v };
            let (start, end) = (swap(d.start), swap(d.end));
            self.set_edge_vertices(e, start, end)?;
        }
        tracing::debug!(?keep, ?absorb, gap, "merge vertices");
        Ok(())
    }

    fn set_vertex_modeling(&mut self, vertex: VertexKey, modeling: Modeling) -> Result<()> {
        self.vertex_mut(vertex)?.modeling = modeling;
        Ok(())
    }

    /// Stitches `absorb` onto `keep`: the end vertices are merged, the
    /// coedges of `absorb` join the partner ring of `keep`, and `absorb` is
    /// lost.
    ///
    /// The edges must be coincident. A gap above `resabs` makes `keep`
    /// tolerant and is recorded in a healing attribute.
    pub fn stitch_edges(&mut self, keep: EdgeKey, absorb: EdgeKey) -> Result<()> {
        if keep == absorb {
            return Ok(());
        }
        let kd = self.edge(keep).ok_or(Error::NotFound(keep.into()))?.clone();
        let ad = self.edge(absorb).ok_or(Error::NotFound(absorb.into()))?.clone();
        let gap = self
            .point_set_distance(keep, absorb)
            .ok_or(Error::UnboundedEdge(absorb.into()))?;
        if !self.coincident(keep, absorb) {
            let tolerance = self
                .tolerance(keep.into())
                .unwrap_or(0.0)
                .max(self.tolerance(absorb.into()).unwrap_or(0.0))
                .max(self.resabs());
            return Err(Error::NotCoincident {
                distance: gap,
                tolerance,
            });
        }

        let position = |v: Option<VertexKey>| v.and_then(|v| self.vertex_position(v));
        let (ks, ke, as_, ae) = (
            position(kd.start),
            position(kd.end),
            position(ad.start),
            position(ad.end),
        );
        let dist = |a: Option<nalgebra::Point3<f64>>, b: Option<nalgebra::Point3<f64>>| match (a, b) {
            (Some(a), Some(b)) => (a - b).norm(),
            _ => 0.0,
        };
        let aligned = dist(ks, as_) + dist(ke, ae) <= dist(ks, ae) + dist(ke, as_);

        let pairs = if aligned {
            [(kd.start, ad.start), (kd.end, ad.end)]
        } else {
            [(kd.start, ad.end), (kd.end, ad.start)]
        };
        for (k, a) in pairs {
            if let (Some(k), Some(a)) = (k, a) {
                if self.vertex(a).is_some() && k != a {
                    let vertex_gap = self.point_set_distance(k, a).unwrap_or(0.0);
                    self.absorb_vertex(k, a, vertex_gap)?;
                }
            }
        }

        // Hand the coedges over, flipping senses when the edges run opposite
        // ways, and rebuild one partner ring.
        let mut ring = self.edge_coedges(keep);
        for c in self.edge_coedges(absorb) {
            let data = self.coedge_mut(c)?;
            data.edge = keep;
            if !aligned {
                data.sense = !data.sense;
            }
            ring.push(c);
        }
        let n = ring.len();
        for (i, &c) in ring.iter().enumerate() {
            let partner = (n > 1).then(|| ring[(i + 1) % n]);
            self.coedge_mut(c)?.partner = partner;
        }
        self.edge_mut(keep)?.coedge = ring.first().copied();
        self.edge_mut(absorb)?.coedge = None;

        if gap > self.resabs() {
            let original = kd.modeling.stored_tolerance();
            let tolerance = original.unwrap_or(0.0).max(gap);
            self.make_tolerant_edge(keep, tolerance, true)?;
            self.add_attribute(
                keep,
                AttributeKind::Healing(HealingAttrib {
                    gap,
                    original_tolerance: original,
                    note: "stitched edges".into(),
                }),
            )?;
        }
        self.merge_attributes(keep.into(), absorb.into())?;
        self.lose(absorb)?;
        self.invalidate_edge(keep)?;
        tracing::debug!(?keep, ?absorb, gap, aligned, "stitch edges");
        Ok(())
    }
}
