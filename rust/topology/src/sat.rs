// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Versioned text persistence.
//!
//! A saved model is a header line `tolbrep <version> <count>`, then one
//! record per live entity and a closing `End-of-file`:
//!
//! ```text
//! tolbrep 600 3
//! -0 vertex $1 1 $-1 exact #
//! -1 point 0 0 0 #
//! ...
//! End-of-file
//! ```
//!
//! Records are numbered from zero in the order of [`BrepArena::entities`].
//! References are written `$<index>`, with `$-1` for none. Senses are
//! `forward`/`reversed`, logicals `T`/`F`, and strings `@<len> <text>`.
//!
//! Versions are `100 * major + minor`. Fields introduced after the oldest
//! readable version are only written (and only read) when the file version
//! is at least their gate; older files restore them with defaults.

use std::path::Path;

use nalgebra::{Point2, Point3, Vector3};
use rustc_hash::FxHashMap;

use crate::arena::BrepArena;
use crate::attribute::*;
use crate::config::ModelingOptions;
use crate::entity::*;
use crate::error::{Error, Result};
use crate::geometry::{Counted, Curve, Interval, Pcurve, Surface};
use crate::keys::*;

/// Oldest version this crate reads or writes.
pub const BASE_VERSION: u32 = 100;
/// Edge convexity and stored parameter range.
pub const CONVEXITY_VERSION: u32 = 200;
/// Exact/tolerant modeling state of vertices, edges and coedges.
pub const TOLERANT_VERSION: u32 = 300;
/// Face sidedness and containment.
pub const SIDES_VERSION: u32 = 400;
/// Loop classification.
pub const LOOP_TYPE_VERSION: u32 = 500;
/// Attribute records.
pub const ATTRIB_VERSION: u32 = 600;
pub const CURRENT_VERSION: u32 = ATTRIB_VERSION;

const MAGIC: &str = "tolbrep";
const END: &str = "End-of-file";

fn check_version(version: u32) -> Result<()> {
    if (BASE_VERSION..=CURRENT_VERSION).contains(&version) {
        Ok(())
    } else {
        Err(Error::UnsupportedVersion(version))
    }
}

// ============================================================================
// Writing
// ============================================================================

struct Writer<'a> {
    arena: &'a BrepArena,
    version: u32,
    index: FxHashMap<EntityKey, usize>,
    out: String,
}

impl Writer<'_> {
    fn word(&mut self, w: &str) {
        self.out.push(' ');
        self.out.push_str(w);
    }

    fn float(&mut self, v: f64) {
        self.word(&v.to_string());
    }

    fn count(&mut self, n: usize) {
        self.word(&n.to_string());
    }

    fn text(&mut self, s: &str) {
        self.word(&format!("@{} {}", s.len(), s));
    }

    fn logical(&mut self, b: bool) {
        self.word(if b { "T" } else { "F" });
    }

    fn ptr<K: Into<EntityKey>>(&mut self, key: Option<K>) {
        match key.and_then(|k| self.index.get(&k.into()).copied()) {
            Some(i) => self.word(&format!("${i}")),
            None => self.word("$-1"),
        }
    }

    fn point3(&mut self, p: &Point3<f64>) {
        self.float(p.x);
        self.float(p.y);
        self.float(p.z);
    }

    fn vector3(&mut self, v: &Vector3<f64>) {
        self.point3(&Point3::from(*v));
    }

    fn modeling(&mut self, modeling: Modeling) {
        if self.version < TOLERANT_VERSION {
            return;
        }
        match modeling {
            Modeling::Exact => self.word("exact"),
            Modeling::Tolerant { tolerance } => {
                self.word("tolerant");
                self.float(tolerance);
            }
        }
    }

    fn dict(&mut self, value: &DictValue) {
        match value {
            DictValue::Int(i) => {
                self.word("int");
                self.word(&i.to_string());
            }
            DictValue::Double(d) => {
                self.word("double");
                self.float(*d);
            }
            DictValue::String(s) => {
                self.word("string");
                self.text(s);
            }
            DictValue::List(items) => {
                self.word("list");
                self.count(items.len());
                for item in items {
                    self.dict(item);
                }
            }
        }
    }

    fn entity(&mut self, i: usize, key: EntityKey) {
        self.out.push_str(&format!("-{i} {}", key.entity_type()));
        let arena = self.arena;
        match key {
            EntityKey::Body(k) => {
                if let Some(d) = arena.body(k) {
                    self.ptr(d.first_lump);
                    self.ptr(d.first_wire);
                }
            }
            EntityKey::Lump(k) => {
                if let Some(d) = arena.lump(k) {
                    self.ptr(d.body);
                    self.ptr(d.next);
                    self.ptr(d.first_shell);
                }
            }
            EntityKey::Shell(k) => {
                if let Some(d) = arena.shell(k) {
                    self.ptr(d.lump);
                    self.ptr(d.next);
                    self.ptr(d.first_face);
                }
            }
            EntityKey::Face(k) => {
                if let Some(d) = arena.face(k) {
                    self.ptr(d.shell);
                    self.ptr(d.next);
                    self.ptr(d.first_loop);
                    self.ptr(d.surface);
                    self.word(d.sense.as_str());
                    if self.version >= SIDES_VERSION {
                        self.word(match d.sides {
                            Sidedness::Single => "single",
                            Sidedness::Double => "double",
                        });
                        self.word(match d.containment {
                            Containment::Out => "out",
                            Containment::In => "in",
                        });
                    }
                }
            }
            EntityKey::Loop(k) => {
                if let Some(d) = arena.loop_data(k) {
                    self.ptr(d.face);
                    self.ptr(d.next);
                    self.ptr(d.start);
                    if self.version >= LOOP_TYPE_VERSION {
                        self.word(d.kind.as_str());
                    }
                }
            }
            EntityKey::Wire(k) => {
                if let Some(d) = arena.wire(k) {
                    self.ptr(d.body);
                    self.ptr(d.next);
                    self.ptr(d.coedge);
                }
            }
            EntityKey::Coedge(k) => {
                if let Some(d) = arena.coedge(k) {
                    self.ptr(Some(d.edge));
                    self.ptr(d.owner);
                    self.ptr(d.next);
                    self.ptr(d.previous);
                    self.ptr(d.partner);
                    self.word(d.sense.as_str());
                    self.ptr(d.pcurve);
                    self.modeling(d.modeling);
                }
            }
            EntityKey::Edge(k) => {
                if let Some(d) = arena.edge(k) {
                    self.ptr(d.start);
                    self.ptr(d.end);
                    self.ptr(d.coedge);
                    self.ptr(d.curve);
                    self.word(d.sense.as_str());
                    if self.version >= CONVEXITY_VERSION {
                        self.word(d.convexity.as_str());
                        self.logical(d.param_range.is_some());
                        if let Some(r) = d.param_range {
                            self.float(r.start);
                            self.float(r.end);
                        }
                    }
                    self.modeling(d.modeling);
                }
            }
            EntityKey::Vertex(k) => {
                if let Some(d) = arena.vertex(k) {
                    self.ptr(Some(d.point));
                    self.count(d.edges.len());
                    for &e in &d.edges {
                        self.ptr(Some(e));
                    }
                    self.modeling(d.modeling);
                }
            }
            EntityKey::Point(k) => {
                if let Some(d) = arena.point(k) {
                    self.point3(&d.geometry);
                }
            }
            EntityKey::Curve(k) => {
                if let Some(d) = arena.curve(k) {
                    match &d.geometry {
                        Curve::Straight { root, direction } => {
                            self.word("straight");
                            self.point3(root);
                            self.vector3(direction);
                        }
                        Curve::Circle {
                            centre,
                            normal,
                            major,
                        } => {
                            self.word("circle");
                            self.point3(centre);
                            self.vector3(normal);
                            self.vector3(major);
                        }
                    }
                }
            }
            EntityKey::Pcurve(k) => {
                if let Some(d) = arena.pcurve(k) {
                    self.count(d.geometry.points.len());
                    for uv in &d.geometry.points {
                        self.float(uv.x);
                        self.float(uv.y);
                    }
                }
            }
            EntityKey::Surface(k) => {
                if let Some(d) = arena.surface(k) {
                    match &d.geometry {
                        Surface::Plane {
                            root,
                            normal,
                            u_dir,
                        } => {
                            self.word("plane");
                            self.point3(root);
                            self.vector3(normal);
                            self.vector3(u_dir);
                        }
                        Surface::Sphere {
                            centre,
                            radius,
                            pole,
                            u_dir,
                        } => {
                            self.word("sphere");
                            self.point3(centre);
                            self.float(*radius);
                            self.vector3(pole);
                            self.vector3(u_dir);
                        }
                        Surface::Cylinder {
                            root,
                            axis,
                            radius,
                            u_dir,
                        } => {
                            self.word("cylinder");
                            self.point3(root);
                            self.vector3(axis);
                            self.float(*radius);
                            self.vector3(u_dir);
                        }
                    }
                }
            }
            EntityKey::Attrib(k) => {
                if let Some(d) = arena.attrib(k) {
                    self.ptr(Some(d.owner));
                    self.word(d.kind.type_name());
                    match &d.kind {
                        AttributeKind::Generic(g) => {
                            self.text(&g.name);
                            self.dict(&g.value);
                        }
                        AttributeKind::Healing(h) => {
                            self.float(h.gap);
                            self.logical(h.original_tolerance.is_some());
                            if let Some(t) = h.original_tolerance {
                                self.float(t);
                            }
                            self.text(&h.note);
                        }
                        AttributeKind::Blend(b) => self.float(b.radius),
                        AttributeKind::Annotation(a) => {
                            self.word(a.kind.as_str());
                            for members in [&a.inputs, &a.outputs] {
                                self.count(members.len());
                                for m in members {
                                    self.ptr(*m);
                                }
                            }
                        }
                    }
                }
            }
        }
        self.out.push_str(" #\n");
    }
}

impl BrepArena {
    /// Saves the model in the version set by [`ModelingOptions::save_version`].
    pub fn to_sat(&self) -> Result<String> {
        self.to_sat_version(self.options.save_version)
    }

    /// Saves the model in an explicit file version, omitting fields newer
    /// than that version.
    pub fn to_sat_version(&self, version: u32) -> Result<String> {
        check_version(version)?;
        let keys: Vec<EntityKey> = self
            .entities()
            .into_iter()
            .filter(|k| version >= ATTRIB_VERSION || k.entity_type() != EntityType::Attrib)
            .collect();
        let index = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
        let mut writer = Writer {
            arena: self,
            version,
            index,
            out: format!("{MAGIC} {version} {}\n", keys.len()),
        };
        for (i, key) in keys.iter().enumerate() {
            writer.entity(i, *key);
        }
        writer.out.push_str(END);
        writer.out.push('\n');
        tracing::debug!(version, entities = keys.len(), "saved model");
        Ok(writer.out)
    }

    pub fn save_sat(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_sat()?)?;
        Ok(())
    }

    /// Restores a model with default options. The result has an empty
    /// history.
    pub fn from_sat(text: &str) -> Result<Self> {
        Self::from_sat_with_options(text, ModelingOptions::default())
    }

    pub fn from_sat_with_options(text: &str, options: ModelingOptions) -> Result<Self> {
        let (version, records) = lex(text)?;
        if version < CURRENT_VERSION {
            tracing::warn!(
                version,
                current = CURRENT_VERSION,
                "restoring older file; newer fields take default values"
            );
        }
        let mut arena = BrepArena::with_options(options);
        let keys = allocate(&mut arena, &records)?;
        for (i, record) in records.iter().enumerate() {
            let mut fields = Fields {
                record: i,
                fields: &record.fields,
                pos: 0,
                keys: &keys,
            };
            fill(&mut arena, version, keys[i], record.ty, &mut fields)?;
            fields.finish()?;
        }
        recount_uses(&mut arena);
        tracing::debug!(version, entities = records.len(), "restored model");
        Ok(arena)
    }

    pub fn load_sat(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_sat(&text)
    }
}

// ============================================================================
// Reading
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Field<'a> {
    Word(&'a str),
    Text(&'a str),
}

#[derive(Debug)]
struct RawRecord<'a> {
    ty: &'a str,
    fields: Vec<Field<'a>>,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn word(&mut self) -> Option<&'a str> {
        let rest = &self.src[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            return None;
        }
        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        self.pos += end;
        Some(&trimmed[..end])
    }

    /// Reads `len` bytes after the single separator following `@<len>`.
    fn text(&mut self, len: usize) -> Option<&'a str> {
        let start = self.pos + 1;
        let end = start.checked_add(len)?;
        let s = self.src.get(start..end)?;
        self.pos = end;
        Some(s)
    }
}

fn lex(text: &str) -> Result<(u32, Vec<RawRecord<'_>>)> {
    let mut lexer = Lexer { src: text, pos: 0 };
    let header = |r: usize, m: &str| Error::restore(r, format!("bad header: {m}"));
    if lexer.word() != Some(MAGIC) {
        return Err(header(0, "missing magic"));
    }
    let version: u32 = lexer
        .word()
        .and_then(|w| w.parse().ok())
        .ok_or_else(|| header(0, "missing version"))?;
    check_version(version)?;
    let count: usize = lexer
        .word()
        .and_then(|w| w.parse().ok())
        .ok_or_else(|| header(0, "missing entity count"))?;

    let mut records = Vec::with_capacity(count.min(1 << 16));
    loop {
        let i = records.len();
        let Some(tag) = lexer.word() else {
            return Err(Error::restore(i, "unexpected end of input"));
        };
        if tag == END {
            break;
        }
        if tag.strip_prefix('-').and_then(|n| n.parse::<usize>().ok()) != Some(i) {
            return Err(Error::restore(i, format!("expected record -{i}, found {tag:?}")));
        }
        let ty = lexer
            .word()
            .ok_or_else(|| Error::restore(i, "missing entity type"))?;
        let mut fields = Vec::new();
        loop {
            match lexer.word() {
                None => return Err(Error::restore(i, "unterminated record")),
                Some("#") => break,
                Some(w) => match w.strip_prefix('@') {
                    Some(len) => {
                        let s = len
                            .parse()
                            .ok()
                            .and_then(|len| lexer.text(len))
                            .ok_or_else(|| Error::restore(i, "bad string"))?;
                        fields.push(Field::Text(s));
                    }
                    None => fields.push(Field::Word(w)),
                },
            }
        }
        records.push(RawRecord { ty, fields });
    }
    if records.len() != count {
        return Err(Error::restore(
            records.len(),
            format!("header announces {count} entities"),
        ));
    }
    Ok((version, records))
}

/// Cursor over the fields of one record.
struct Fields<'r, 'a> {
    record: usize,
    fields: &'r [Field<'a>],
    pos: usize,
    keys: &'r [Option<EntityKey>],
}

impl<'a> Fields<'_, 'a> {
    fn err(&self, message: impl Into<String>) -> Error {
        Error::restore(self.record, message)
    }

    fn next(&mut self) -> Result<Field<'a>> {
        let field = self
            .fields
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.err("too few fields"))?;
        self.pos += 1;
        Ok(field)
    }

    fn word(&mut self) -> Result<&'a str> {
        match self.next()? {
            Field::Word(w) => Ok(w),
            Field::Text(_) => Err(self.err("expected a word, found a string")),
        }
    }

    fn text(&mut self) -> Result<String> {
        match self.next()? {
            Field::Text(s) => Ok(s.to_string()),
            Field::Word(w) => Err(self.err(format!("expected a string, found {w:?}"))),
        }
    }

    fn parse<T: std::str::FromStr>(&mut self) -> Result<T> {
        let w = self.word()?;
        w.parse().map_err(|_| self.err(format!("cannot parse {w:?}")))
    }

    fn float(&mut self) -> Result<f64> {
        self.parse()
    }

    fn point3(&mut self) -> Result<Point3<f64>> {
        Ok(Point3::new(self.float()?, self.float()?, self.float()?))
    }

    fn vector3(&mut self) -> Result<Vector3<f64>> {
        Ok(self.point3()?.coords)
    }

    fn logical(&mut self) -> Result<bool> {
        match self.word()? {
            "T" => Ok(true),
            "F" => Ok(false),
            w => Err(self.err(format!("expected T or F, found {w:?}"))),
        }
    }

    fn sense(&mut self) -> Result<Sense> {
        let w = self.word()?;
        Sense::parse(w).ok_or_else(|| self.err(format!("bad sense {w:?}")))
    }

    fn entity(&mut self) -> Result<Option<EntityKey>> {
        let w = self.word()?;
        let index = w
            .strip_prefix('$')
            .and_then(|n| n.parse::<i64>().ok())
            .ok_or_else(|| self.err(format!("expected a reference, found {w:?}")))?;
        if index < 0 {
            return Ok(None);
        }
        self.keys
            .get(index as usize)
            .copied()
            .flatten()
            .map(Some)
            .ok_or_else(|| self.err(format!("dangling reference {w}")))
    }

    fn key<K: TryFrom<EntityKey, Error = EntityKey>>(&mut self) -> Result<Option<K>> {
        match self.entity()? {
            None => Ok(None),
            Some(key) => K::try_from(key)
                .map(Some)
                .map_err(|k| self.err(format!("reference to {} has the wrong type", k.entity_type()))),
        }
    }

    fn required<K: TryFrom<EntityKey, Error = EntityKey>>(&mut self, what: &str) -> Result<K> {
        self.key()?.ok_or_else(|| self.err(format!("missing {what}")))
    }

    fn modeling(&mut self, version: u32) -> Result<Modeling> {
        if version < TOLERANT_VERSION {
            return Ok(Modeling::Exact);
        }
        match self.word()? {
            "exact" => Ok(Modeling::Exact),
            "tolerant" => Ok(Modeling::Tolerant {
                tolerance: self.float()?,
            }),
            w => Err(self.err(format!("bad modeling state {w:?}"))),
        }
    }

    fn dict(&mut self) -> Result<DictValue> {
        match self.word()? {
            "int" => Ok(DictValue::Int(self.parse()?)),
            "double" => Ok(DictValue::Double(self.float()?)),
            "string" => Ok(DictValue::String(self.text()?)),
            "list" => {
                let n: usize = self.parse()?;
                (0..n)
                    .map(|_| self.dict())
                    .collect::<Result<Vec<_>>>()
                    .map(DictValue::List)
            }
            w => Err(self.err(format!("bad value type {w:?}"))),
        }
    }

    fn unallocated(&self) -> Error {
        self.err("record was not allocated")
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.fields.len() {
            Ok(())
        } else {
            Err(self.err("trailing fields"))
        }
    }
}

/// A stored direction; zero vectors are rejected as they are by the
/// geometry constructors.
fn direction(f: &mut Fields, what: &str) -> Result<Vector3<f64>> {
    let v = f.vector3()?;
    if v.norm() > f64::EPSILON {
        Ok(v)
    } else {
        Err(f.err(format!("zero {what}")))
    }
}

/// A stored reference direction that must not be parallel to `axis`.
fn across(f: &mut Fields, axis: &Vector3<f64>, what: &str) -> Result<Vector3<f64>> {
    let v = f.vector3()?;
    let n = axis.normalize();
    if (v - n * v.dot(&n)).norm() > f64::EPSILON {
        Ok(v)
    } else {
        Err(f.err(format!("{what} is parallel to the axis")))
    }
}

fn radius(f: &mut Fields) -> Result<f64> {
    let r = f.float()?;
    if r > 0.0 && r.is_finite() {
        Ok(r)
    } else {
        Err(f.err(format!("radius must be positive, found {r}")))
    }
}

fn curve(f: &mut Fields) -> Result<Curve> {
    match f.word()? {
        "straight" => {
            let root = f.point3()?;
            let direction = direction(f, "line direction")?;
            Ok(Curve::Straight { root, direction })
        }
        "circle" => {
            let centre = f.point3()?;
            let normal = direction(f, "circle normal")?;
            let major = across(f, &normal, "circle major axis")?;
            Ok(Curve::Circle {
                centre,
                normal,
                major,
            })
        }
        w => Err(f.err(format!("unknown curve {w:?}"))),
    }
}

fn surface(f: &mut Fields) -> Result<Surface> {
    match f.word()? {
        "plane" => {
            let root = f.point3()?;
            let normal = direction(f, "plane normal")?;
            let u_dir = across(f, &normal, "plane u direction")?;
            Ok(Surface::Plane { root, normal, u_dir })
        }
        "sphere" => {
            let centre = f.point3()?;
            let radius = radius(f)?;
            let pole = direction(f, "sphere pole")?;
            let u_dir = across(f, &pole, "sphere u direction")?;
            Ok(Surface::Sphere {
                centre,
                radius,
                pole,
                u_dir,
            })
        }
        "cylinder" => {
            let root = f.point3()?;
            let axis = direction(f, "cylinder axis")?;
            let radius = radius(f)?;
            let u_dir = across(f, &axis, "cylinder u direction")?;
            Ok(Surface::Cylinder {
                root,
                axis,
                radius,
                u_dir,
            })
        }
        w => Err(f.err(format!("unknown surface {w:?}"))),
    }
}

fn pcurve(f: &mut Fields) -> Result<Pcurve> {
    let n: usize = f.parse()?;
    let points = (0..n)
        .map(|_| -> Result<Point2<f64>> { Ok(Point2::new(f.float()?, f.float()?)) })
        .collect::<Result<Vec<_>>>()?;
    Pcurve::new(points).ok_or_else(|| f.err("pcurve needs two points"))
}

/// First pass: creates every entity except attributes, so references can
/// be resolved in any direction. Geometry is complete after this pass;
/// topology holds placeholders.
fn allocate(arena: &mut BrepArena, records: &[RawRecord]) -> Result<Vec<Option<EntityKey>>> {
    let mut keys = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let ty = EntityType::parse(record.ty)
            .ok_or_else(|| Error::restore(i, format!("unknown entity type {:?}", record.ty)))?;
        let mut f = Fields {
            record: i,
            fields: &record.fields,
            pos: 0,
            keys: &[],
        };
        let key: Option<EntityKey> = match ty {
            EntityType::Body => Some(arena.bodies.insert(BodyData::default()).into()),
            EntityType::Lump => Some(arena.lumps.insert(LumpData::default()).into()),
            EntityType::Shell => Some(arena.shells.insert(ShellData::default()).into()),
            EntityType::Face => Some(arena.faces.insert(FaceData::default()).into()),
            EntityType::Loop => Some(arena.loops.insert(LoopData::default()).into()),
            EntityType::Wire => Some(arena.wires.insert(WireData::default()).into()),
            EntityType::Coedge => Some(arena.coedges.insert(CoedgeData::default()).into()),
            EntityType::Edge => Some(arena.edges.insert(EdgeData::default()).into()),
            EntityType::Vertex => Some(arena.vertices.insert(VertexData::default()).into()),
            EntityType::Point => {
                let p = f.point3()?;
                f.finish()?;
                Some(arena.points.insert(Counted::new(p)).into())
            }
            EntityType::Curve => {
                let c = curve(&mut f)?;
                f.finish()?;
                Some(arena.curves.insert(Counted::new(c)).into())
            }
            EntityType::Pcurve => {
                let p = pcurve(&mut f)?;
                f.finish()?;
                Some(arena.pcurves.insert(Counted::new(p)).into())
            }
            EntityType::Surface => {
                let s = surface(&mut f)?;
                f.finish()?;
                Some(arena.surfaces.insert(Counted::new(s)).into())
            }
            EntityType::Attrib => None,
        };
        keys.push(key);
    }
    Ok(keys)
}

/// Second pass: fills topology and creates attributes.
fn fill(
    arena: &mut BrepArena,
    version: u32,
    key: Option<EntityKey>,
    ty: &str,
    f: &mut Fields,
) -> Result<()> {
    match key {
        Some(EntityKey::Body(k)) => {
            let data = BodyData {
                first_lump: f.key()?,
                first_wire: f.key()?,
            };
            *arena.bodies.get_mut(k).ok_or_else(|| f.unallocated())? = data;
        }
        Some(EntityKey::Lump(k)) => {
            let data = LumpData {
                body: f.key()?,
                next: f.key()?,
                first_shell: f.key()?,
            };
            *arena.lumps.get_mut(k).ok_or_else(|| f.unallocated())? = data;
        }
        Some(EntityKey::Shell(k)) => {
            let data = ShellData {
                lump: f.key()?,
                next: f.key()?,
                first_face: f.key()?,
            };
            *arena.shells.get_mut(k).ok_or_else(|| f.unallocated())? = data;
        }
        Some(EntityKey::Face(k)) => {
            let mut data = FaceData {
                shell: f.key()?,
                next: f.key()?,
                first_loop: f.key()?,
                surface: f.key()?,
                sense: f.sense()?,
                ..Default::default()
            };
            if version >= SIDES_VERSION {
                data.sides = match f.word()? {
                    "single" => Sidedness::Single,
                    "double" => Sidedness::Double,
                    w => return Err(f.err(format!("bad sidedness {w:?}"))),
                };
                data.containment = match f.word()? {
                    "out" => Containment::Out,
                    "in" => Containment::In,
                    w => return Err(f.err(format!("bad containment {w:?}"))),
                };
            }
            *arena.faces.get_mut(k).ok_or_else(|| f.unallocated())? = data;
        }
        Some(EntityKey::Loop(k)) => {
            let mut data = LoopData {
                face: f.key()?,
                next: f.key()?,
                start: f.key()?,
                kind: LoopType::Unknown,
            };
            if version >= LOOP_TYPE_VERSION {
                let w = f.word()?;
                data.kind = LoopType::parse(w).ok_or_else(|| f.err(format!("bad loop type {w:?}")))?;
            }
            *arena.loops.get_mut(k).ok_or_else(|| f.unallocated())? = data;
        }
        Some(EntityKey::Wire(k)) => {
            let data = WireData {
                body: f.key()?,
                next: f.key()?,
                coedge: f.key()?,
            };
            *arena.wires.get_mut(k).ok_or_else(|| f.unallocated())? = data;
        }
        Some(EntityKey::Coedge(k)) => {
            let edge = f.required("edge")?;
            let owner = match f.entity()? {
                None => None,
                Some(EntityKey::Loop(l)) => Some(CoedgeOwner::Loop(l)),
                Some(EntityKey::Wire(w)) => Some(CoedgeOwner::Wire(w)),
                Some(other) => {
                    return Err(f.err(format!("coedge owned by a {}", other.entity_type())));
                }
            };
            let data = CoedgeData {
                edge,
                owner,
                next: f.key()?,
                previous: f.key()?,
                partner: f.key()?,
                sense: f.sense()?,
                pcurve: f.key()?,
                modeling: f.modeling(version)?,
            };
            *arena.coedges.get_mut(k).ok_or_else(|| f.unallocated())? = data;
        }
        Some(EntityKey::Edge(k)) => {
            let mut data = EdgeData {
                start: f.key()?,
                end: f.key()?,
                coedge: f.key()?,
                curve: f.key()?,
                sense: f.sense()?,
                ..Default::default()
            };
            if version >= CONVEXITY_VERSION {
                let w = f.word()?;
                data.convexity =
                    Convexity::parse(w).ok_or_else(|| f.err(format!("bad convexity {w:?}")))?;
                if f.logical()? {
                    data.param_range = Some(Interval::new(f.float()?, f.float()?));
                }
            }
            data.modeling = f.modeling(version)?;
            *arena.edges.get_mut(k).ok_or_else(|| f.unallocated())? = data;
        }
        Some(EntityKey::Vertex(k)) => {
            let point = f.required("point")?;
            let n: usize = f.parse()?;
            let edges = (0..n)
                .map(|_| f.required("edge"))
                .collect::<Result<Vec<EdgeKey>>>()?;
            let data = VertexData {
                point,
                edges,
                modeling: f.modeling(version)?,
            };
            *arena.vertices.get_mut(k).ok_or_else(|| f.unallocated())? = data;
        }
        // Geometry was read completely during allocation.
        Some(_) => f.pos = f.fields.len(),
        None if ty == EntityType::Attrib.as_str() => {
            if version < ATTRIB_VERSION {
                return Err(f.err("attribute record in a file without attributes"));
            }
            let owner = f.entity()?.ok_or_else(|| f.err("attribute without owner"))?;
            let kind = match f.word()? {
                "generic" => AttributeKind::Generic(GenericAttrib {
                    name: f.text()?,
                    value: f.dict()?,
                }),
                "healing" => {
                    let gap = f.float()?;
                    let original_tolerance = if f.logical()? { Some(f.float()?) } else { None };
                    AttributeKind::Healing(HealingAttrib {
                        gap,
                        original_tolerance,
                        note: f.text()?,
                    })
                }
                "blend" => AttributeKind::Blend(BlendAttrib { radius: f.float()? }),
                "annotation" => {
                    let w = f.word()?;
                    let kind = AnnotationKind::parse(w)
                        .ok_or_else(|| f.err(format!("bad annotation kind {w:?}")))?;
                    let mut members = || -> Result<Vec<Option<EntityKey>>> {
                        let n: usize = f.parse()?;
                        (0..n).map(|_| f.entity()).collect()
                    };
                    let inputs = members()?;
                    let outputs = members()?;
                    AttributeKind::Annotation(Annotation {
                        kind,
                        inputs,
                        outputs,
                    })
                }
                w => return Err(f.err(format!("unknown attribute {w:?}"))),
            };
            arena.attribs.insert(AttribData { owner, kind });
        }
        None => return Err(f.err(format!("unknown entity type {ty:?}"))),
    }
    Ok(())
}

/// Use counts are not saved; they follow from the references.
fn recount_uses(arena: &mut BrepArena) {
    let points: Vec<PointKey> = arena.vertices.iter().map(|(_, v)| v.point).collect();
    let curves: Vec<CurveKey> = arena.edges.iter().filter_map(|(_, e)| e.curve).collect();
    let pcurves: Vec<PcurveKey> = arena.coedges.iter().filter_map(|(_, c)| c.pcurve).collect();
    let surfaces: Vec<SurfaceKey> = arena.faces.iter().filter_map(|(_, f)| f.surface).collect();
    for p in points {
        if let Some(g) = arena.points.get_mut(p) {
            g.use_count += 1;
        }
    }
    for c in curves {
        if let Some(g) = arena.curves.get_mut(c) {
            g.use_count += 1;
        }
    }
    for p in pcurves {
        if let Some(g) = arena.pcurves.get_mut(p) {
            g.use_count += 1;
        }
    }
    for s in surfaces {
        if let Some(g) = arena.surfaces.get_mut(s) {
            g.use_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn block() -> (BrepArena, BodyKey) {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("block");
        let body = tx
            .make_block(Point3::origin(), Point3::new(1.0, 2.0, 3.0))
            .unwrap();
        tx.commit();
        (arena, body)
    }

    fn first_body(arena: &BrepArena) -> BodyKey {
        arena.bodies.keys().next().unwrap()
    }

    #[test]
    fn block_round_trips_to_identical_text() {
        let (mut arena, body) = block();
        let mut tx = arena.begin("classify");
        for e in tx.body_edges(body) {
            tx.edge_convexity_mut(e).unwrap();
        }
        for f in tx.body_faces(body) {
            for l in tx.face_loops(f) {
                tx.loop_type_mut(l).unwrap();
            }
        }
        tx.commit();

        let text = arena.to_sat().unwrap();
        assert!(text.starts_with("tolbrep 600 "));
        assert!(text.ends_with("End-of-file\n"));

        let restored = BrepArena::from_sat(&text).unwrap();
        assert_eq!(restored.to_sat().unwrap(), text);
        assert!(!restored.history().can_undo());

        let body = first_body(&restored);
        assert_eq!(restored.body_faces(body).len(), 6);
        assert_eq!(restored.body_edges(body).len(), 12);
        for e in restored.body_edges(body) {
            assert_eq!(restored.edge(e).unwrap().convexity, Convexity::Convex);
            let ring = restored.edge_coedges(e);
            assert_eq!(ring.len(), 2);
            for &c in &ring {
                let partner = restored.coedge(c).unwrap().partner.unwrap();
                assert_eq!(restored.coedge(partner).unwrap().edge, e);
            }
        }
        for f in restored.body_faces(body) {
            let l = restored.face_loops(f)[0];
            assert_eq!(restored.loop_data(l).unwrap().kind, LoopType::Periphery);
        }
    }

    #[test]
    fn use_counts_are_rebuilt() {
        let (arena, _) = block();
        let restored = BrepArena::from_sat(&arena.to_sat().unwrap()).unwrap();
        for (_, p) in restored.points.iter() {
            assert_eq!(p.use_count, 1);
        }
        for (_, s) in restored.surfaces.iter() {
            assert_eq!(s.use_count, 1);
        }
        for (_, c) in restored.curves.iter() {
            assert_eq!(c.use_count, 1);
        }
    }

    #[test]
    fn tolerances_and_ranges_survive() {
        let (mut arena, body) = block();
        let edge = arena.body_edges(body)[0];
        let mut tx = arena.begin("edit");
        let (_, new_edge) = tx.split_edge(edge, 0.25).unwrap();
        tx.make_tolerant_edge(new_edge, 0.001, true).unwrap();
        tx.commit();

        let restored = BrepArena::from_sat(&arena.to_sat().unwrap()).unwrap();
        let tolerant: Vec<EdgeKey> = restored
            .edges
            .iter()
            .filter(|(_, e)| e.modeling.is_tolerant())
            .map(|(k, _)| k)
            .collect();
        assert_eq!(tolerant.len(), 1);
        assert_relative_eq!(restored.tolerance(tolerant[0].into()).unwrap(), 0.001);
        let ranged = restored
            .edges
            .iter()
            .filter(|(_, e)| e.param_range.is_some())
            .count();
        assert_eq!(ranged, 2);
    }

    #[test]
    fn attributes_round_trip() {
        let (mut arena, body) = block();
        let face = arena.body_faces(body)[0];
        let edge = arena.body_edges(body)[0];
        let generic = AttributeKind::Generic(GenericAttrib {
            name: "material # note".to_string(),
            value: DictValue::List(vec![
                DictValue::String("steel @ 12".to_string()),
                DictValue::Int(-3),
                DictValue::Double(0.125),
            ]),
        });
        let healing = AttributeKind::Healing(HealingAttrib {
            gap: 0.01,
            original_tolerance: None,
            note: "stitched edges".to_string(),
        });
        let mut tx = arena.begin("attributes");
        tx.add_attribute(face, generic.clone()).unwrap();
        tx.add_attribute(edge, healing.clone()).unwrap();
        tx.add_attribute(
            body,
            AttributeKind::Annotation(Annotation {
                kind: AnnotationKind::Sweep,
                inputs: vec![Some(face.into())],
                outputs: vec![None, Some(edge.into())],
            }),
        )
        .unwrap();
        tx.commit();

        let restored = BrepArena::from_sat(&arena.to_sat().unwrap()).unwrap();
        assert_eq!(restored.attrib_count(), 3);
        let kinds: Vec<&AttributeKind> = restored.attribs.iter().map(|(_, a)| &a.kind).collect();
        assert!(kinds.contains(&&generic));
        assert!(kinds.contains(&&healing));
        let annotation = kinds
            .iter()
            .find_map(|k| match k {
                AttributeKind::Annotation(a) => Some(a),
                _ => None,
            })
            .unwrap();
        assert_eq!(annotation.inputs[0].unwrap().entity_type(), EntityType::Face);
        assert_eq!(annotation.outputs[0], None);
        assert_eq!(annotation.outputs[1].unwrap().entity_type(), EntityType::Edge);
    }

    #[test]
    fn older_versions_restore_defaults() {
        let (mut arena, body) = block();
        let edge = arena.body_edges(body)[0];
        let face = arena.body_faces(body)[0];
        let mut tx = arena.begin("state");
        tx.make_tolerant_edge(edge, 0.001, true).unwrap();
        tx.edge_convexity_mut(edge).unwrap();
        tx.set_face_sides(face, Sidedness::Double, Containment::In).unwrap();
        tx.add_attribute(edge, AttributeKind::Blend(BlendAttrib { radius: 0.1 }))
            .unwrap();
        tx.commit();

        let old = arena.to_sat_version(CONVEXITY_VERSION).unwrap();
        assert!(old.starts_with("tolbrep 200 "));
        let restored = BrepArena::from_sat(&old).unwrap();
        assert_eq!(restored.attrib_count(), 0);
        assert!(restored.edges.iter().all(|(_, e)| !e.modeling.is_tolerant()));
        assert!(restored.vertices.iter().all(|(_, v)| !v.modeling.is_tolerant()));
        assert!(restored
            .faces
            .iter()
            .all(|(_, f)| f.sides == Sidedness::Single));
        assert!(restored
            .edges
            .iter()
            .any(|(_, e)| e.convexity == Convexity::Convex));

        let oldest = BrepArena::from_sat(&arena.to_sat_version(BASE_VERSION).unwrap()).unwrap();
        assert!(oldest
            .edges
            .iter()
            .all(|(_, e)| e.convexity == Convexity::Unknown && e.param_range.is_none()));
        assert!(oldest
            .loops
            .iter()
            .all(|(_, l)| l.kind == LoopType::Unknown));
        assert_eq!(oldest.face_count(), 6);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(
            BrepArena::from_sat("tolbrep 9900 0\nEnd-of-file\n"),
            Err(Error::UnsupportedVersion(9900))
        ));
        assert!(BrepArena::from_sat("acis 600 0\nEnd-of-file\n").is_err());
        assert!(BrepArena::from_sat("tolbrep 600 1\nEnd-of-file\n").is_err());
        assert!(BrepArena::from_sat("tolbrep 600 1\n-0 vertex $4 0 exact #\nEnd-of-file\n").is_err());
        assert!(BrepArena::from_sat(
            "tolbrep 600 2\n-0 vertex $0 0 exact #\n-1 point 0 0 0 #\nEnd-of-file\n"
        )
        .is_err());
        assert!(BrepArena::from_sat("tolbrep 600 1\n-0 point 0 0 #\nEnd-of-file\n").is_err());
        assert!(BrepArena::from_sat(
            "tolbrep 600 2\n-0 point 0 0 0 #\n-1 attrib $0 generic @18446744073709551615 x #\nEnd-of-file\n"
        )
        .is_err());

        for geometry in [
            "curve straight 0 0 0 0 0 0",
            "curve circle 0 0 0 0 0 1 0 0 2",
            "surface plane 0 0 0 0 0 0 1 0 0",
            "surface sphere 0 0 0 0 0 0 1 1 0 0",
            "surface cylinder 0 0 0 0 0 1 -1 1 0 0",
        ] {
            let text = format!("tolbrep 600 1\n-0 {geometry} #\nEnd-of-file\n");
            assert!(BrepArena::from_sat(&text).is_err(), "{geometry} restored");
        }
        assert!(BrepArena::from_sat(
            "tolbrep 600 1\n-0 surface sphere 0 0 0 2 0 0 1 1 0 0 #\nEnd-of-file\n"
        )
        .is_ok());

        let single = BrepArena::from_sat(
            "tolbrep 600 2\n-0 vertex $1 0 tolerant 0.5 #\n-1 point 1 2 3 #\nEnd-of-file\n",
        )
        .unwrap();
        let v = single.vertices.keys().next().unwrap();
        assert_eq!(single.vertex_position(v), Some(Point3::new(1.0, 2.0, 3.0)));
        assert_eq!(single.modeling(v.into()), Some(Modeling::Tolerant { tolerance: 0.5 }));
    }

    #[test]
    fn save_and_load_files() {
        let (arena, _) = block();
        let path = std::env::temp_dir().join(format!("tolbrep-sat-{}.sat", std::process::id()));
        arena.save_sat(&path).unwrap();
        let loaded = BrepArena::load_sat(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.face_count(), 6);
    }
}
