// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometric leaf objects referenced by topology.
//!
//! Points, curves, pcurves and surfaces are shared between topology entities
//! and carry a use count (see [`Counted`]). Only evaluation, inversion and
//! closest-point queries live here; there are no intersection algorithms.

use std::f64::consts::TAU;

use nalgebra::{Point2, Point3, Similarity3, Vector3};

/// A geometry value together with the number of topology references to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Counted<T> {
    pub geometry: T,
    pub use_count: u32,
}

impl<T> Counted<T> {
    /// Wraps freshly made geometry; nothing references it yet.
    pub fn new(geometry: T) -> Self {
        Self {
            geometry,
            use_count: 0,
        }
    }
}

/// A closed parameter interval `[start, end]` with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    /// Creates an interval, ordering the bounds.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn mid(&self) -> f64 {
        0.5 * (self.start + self.end)
    }

    /// Returns the parameter at fraction `f` of the interval.
    pub fn interpolate(&self, f: f64) -> f64 {
        self.start + f * self.length()
    }

    /// Returns `true` if `t` lies strictly inside, at least `margin` away
    /// from both bounds.
    pub fn strictly_contains(&self, t: f64, margin: f64) -> bool {
        t > self.start + margin && t < self.end - margin
    }

    pub fn scaled(&self, s: f64) -> Self {
        Self::new(self.start * s, self.end * s)
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn from_point(p: Point3<f64>) -> Self {
        Self { min: p, max: p }
    }

    /// Smallest box containing all points, or `None` for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = Point3<f64>>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let mut aabb = Self::from_point(iter.next()?);
        for p in iter {
            aabb.include(&p);
        }
        Some(aabb)
    }

    pub fn include(&mut self, p: &Point3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Grows the box by `d` in every direction.
    pub fn enlarged(&self, d: f64) -> Aabb {
        let v = Vector3::new(d, d, d);
        Aabb {
            min: self.min - v,
            max: self.max + v,
        }
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).norm()
    }
}

/// A 3D curve. Parameters are arc length for straight lines and angle for
/// circles.
#[derive(Debug, Clone, PartialEq)]
pub enum Curve {
    /// `root + t * direction`, with a unit direction.
    Straight {
        root: Point3<f64>,
        direction: Vector3<f64>,
    },
    /// `centre + cos(t) * major + sin(t) * (normal x major)`; the radius is
    /// the length of `major`, which is perpendicular to the unit `normal`.
    Circle {
        centre: Point3<f64>,
        normal: Vector3<f64>,
        major: Vector3<f64>,
    },
}

impl Curve {
    /// Creates a straight line; `None` if the direction is zero.
    pub fn straight(root: Point3<f64>, direction: Vector3<f64>) -> Option<Self> {
        let direction = direction.try_normalize(f64::EPSILON)?;
        Some(Curve::Straight { root, direction })
    }

    /// Creates a circle; `major` is projected into the plane of `normal`.
    pub fn circle(centre: Point3<f64>, normal: Vector3<f64>, major: Vector3<f64>) -> Option<Self> {
        let normal = normal.try_normalize(f64::EPSILON)?;
        let major = major - normal * major.dot(&normal);
        if major.norm() <= f64::EPSILON {
            return None;
        }
        Some(Curve::Circle {
            centre,
            normal,
            major,
        })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Curve::Circle { .. })
    }

    /// Parameter period of a closed curve.
    pub fn period(&self) -> Option<f64> {
        match self {
            Curve::Straight { .. } => None,
            Curve::Circle { .. } => Some(TAU),
        }
    }

    /// Evaluates the curve at parameter `t`.
    pub fn point(&self, t: f64) -> Point3<f64> {
        match self {
            Curve::Straight { root, direction } => root + direction * t,
            Curve::Circle {
                centre,
                normal,
                major,
            } => centre + major * t.cos() + normal.cross(major) * t.sin(),
        }
    }

    /// First derivative at parameter `t`.
    pub fn tangent(&self, t: f64) -> Vector3<f64> {
        match self {
            Curve::Straight { direction, .. } => *direction,
            Curve::Circle { normal, major, .. } => {
                -major * t.sin() + normal.cross(major) * t.cos()
            }
        }
    }

    /// Parameter of the foot point of `p` on the unbounded curve. Circle
    /// parameters are returned in `[0, 2π)`.
    pub fn param(&self, p: &Point3<f64>) -> f64 {
        match self {
            Curve::Straight { root, direction } => (p - root).dot(direction),
            Curve::Circle {
                centre,
                normal,
                major,
            } => {
                let d = p - centre;
                let t = d.dot(&normal.cross(major)).atan2(d.dot(major));
                if t < 0.0 {
                    t + TAU
                } else {
                    t
                }
            }
        }
    }

    /// Parameter of the point closest to `p`, restricted to `range`.
    pub fn closest_param(&self, p: &Point3<f64>, range: Option<Interval>) -> f64 {
        let t = self.param(p);
        let Some(range) = range else {
            return t;
        };
        let t = match self.period() {
            Some(period) => {
                let mut t = t;
                while t < range.start {
                    t += period;
                }
                while t >= range.start + period {
                    t -= period;
                }
                t
            }
            None => t,
        };
        if t >= range.start && t <= range.end {
            return t;
        }
        let d0 = (self.point(range.start) - p).norm();
        let d1 = (self.point(range.end) - p).norm();
        if d0 <= d1 {
            range.start
        } else {
            range.end
        }
    }

    /// Distance from `p` to the curve restricted to `range`.
    pub fn distance(&self, p: &Point3<f64>, range: Option<Interval>) -> f64 {
        let t = self.closest_param(p, range);
        (self.point(t) - p).norm()
    }

    /// Applies a similarity transform in place.
    pub fn transform(&mut self, s: &Similarity3<f64>) {
        match self {
            Curve::Straight { root, direction } => {
                *root = s.transform_point(root);
                *direction = s.isometry.rotation * *direction;
            }
            Curve::Circle {
                centre,
                normal,
                major,
            } => {
                *centre = s.transform_point(centre);
                *normal = s.isometry.rotation * *normal;
                *major = s.transform_vector(major);
            }
        }
    }
}

/// A parametric surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Surface {
    /// `root + u * u_dir + v * (normal x u_dir)`.
    Plane {
        root: Point3<f64>,
        normal: Vector3<f64>,
        u_dir: Vector3<f64>,
    },
    /// Longitude `u` around `pole`, latitude `v`.
    Sphere {
        centre: Point3<f64>,
        radius: f64,
        pole: Vector3<f64>,
        u_dir: Vector3<f64>,
    },
    /// Angle `u` around `axis`, height `v` along it.
    Cylinder {
        root: Point3<f64>,
        axis: Vector3<f64>,
        radius: f64,
        u_dir: Vector3<f64>,
    },
}

impl Surface {
    /// Creates a plane with an arbitrary in-plane `u` direction.
    pub fn plane(root: Point3<f64>, normal: Vector3<f64>) -> Option<Self> {
        let normal = normal.try_normalize(f64::EPSILON)?;
        Some(Surface::Plane {
            root,
            normal,
            u_dir: any_perpendicular(&normal),
        })
    }

    /// Creates a plane with the given `u` direction, projected into the plane.
    pub fn plane_with_u(root: Point3<f64>, normal: Vector3<f64>, u_dir: Vector3<f64>) -> Option<Self> {
        let normal = normal.try_normalize(f64::EPSILON)?;
        let u_dir = (u_dir - normal * u_dir.dot(&normal)).try_normalize(f64::EPSILON)?;
        Some(Surface::Plane {
            root,
            normal,
            u_dir,
        })
    }

    pub fn sphere(centre: Point3<f64>, radius: f64) -> Option<Self> {
        if radius <= 0.0 {
            return None;
        }
        Some(Surface::Sphere {
            centre,
            radius,
            pole: Vector3::z(),
            u_dir: Vector3::x(),
        })
    }

    pub fn cylinder(root: Point3<f64>, axis: Vector3<f64>, radius: f64) -> Option<Self> {
        if radius <= 0.0 {
            return None;
        }
        let axis = axis.try_normalize(f64::EPSILON)?;
        Some(Surface::Cylinder {
            root,
            axis,
            radius,
            u_dir: any_perpendicular(&axis),
        })
    }

    /// Evaluates the surface at `(u, v)`.
    pub fn point(&self, uv: &Point2<f64>) -> Point3<f64> {
        let (u, v) = (uv.x, uv.y);
        match self {
            Surface::Plane {
                root,
                normal,
                u_dir,
            } => root + u_dir * u + normal.cross(u_dir) * v,
            Surface::Sphere {
                centre,
                radius,
                pole,
                u_dir,
            } => {
                let w = pole.cross(u_dir);
                let radial = (u_dir * u.cos() + w * u.sin()) * v.cos() + pole * v.sin();
                centre + radial * *radius
            }
            Surface::Cylinder {
                root,
                axis,
                radius,
                u_dir,
            } => {
                let w = axis.cross(u_dir);
                root + axis * v + (u_dir * u.cos() + w * u.sin()) * *radius
            }
        }
    }

    /// Inverts a point to surface parameters (foot point).
    pub fn param(&self, p: &Point3<f64>) -> Point2<f64> {
        match self {
            Surface::Plane {
                root,
                normal,
                u_dir,
            } => {
                let d = p - root;
                Point2::new(d.dot(u_dir), d.dot(&normal.cross(u_dir)))
            }
            Surface::Sphere {
                centre,
                pole,
                u_dir,
                ..
            } => {
                let d = (p - centre).try_normalize(f64::EPSILON).unwrap_or(*pole);
                let w = pole.cross(u_dir);
                Point2::new(
                    d.dot(&w).atan2(d.dot(u_dir)),
                    d.dot(pole).clamp(-1.0, 1.0).asin(),
                )
            }
            Surface::Cylinder {
                root, axis, u_dir, ..
            } => {
                let d = p - root;
                let w = axis.cross(u_dir);
                Point2::new(d.dot(&w).atan2(d.dot(u_dir)), d.dot(axis))
            }
        }
    }

    /// Natural (unreversed) unit normal at the foot point of `p`.
    pub fn normal_at(&self, p: &Point3<f64>) -> Vector3<f64> {
        match self {
            Surface::Plane { normal, .. } => *normal,
            Surface::Sphere { centre, pole, .. } => {
                (p - centre).try_normalize(f64::EPSILON).unwrap_or(*pole)
            }
            Surface::Cylinder {
                root, axis, u_dir, ..
            } => {
                let d = p - root;
                (d - axis * d.dot(axis))
                    .try_normalize(f64::EPSILON)
                    .unwrap_or(*u_dir)
            }
        }
    }

    pub fn is_planar(&self) -> bool {
        matches!(self, Surface::Plane { .. })
    }

    /// Maps surface parameters through a uniform scale of the surface, so
    /// that pcurves stay on the transformed surface.
    pub fn scale_params(&self, uv: &Point2<f64>, s: f64) -> Point2<f64> {
        match self {
            Surface::Plane { .. } => Point2::new(uv.x * s, uv.y * s),
            Surface::Sphere { .. } => *uv,
            Surface::Cylinder { .. } => Point2::new(uv.x, uv.y * s),
        }
    }

    /// Applies a similarity transform in place.
    pub fn transform(&mut self, s: &Similarity3<f64>) {
        let rotation = s.isometry.rotation;
        match self {
            Surface::Plane {
                root,
                normal,
                u_dir,
            } => {
                *root = s.transform_point(root);
                *normal = rotation * *normal;
                *u_dir = rotation * *u_dir;
            }
            Surface::Sphere {
                centre,
                radius,
                pole,
                u_dir,
            } => {
                *centre = s.transform_point(centre);
                *radius *= s.scaling();
                *pole = rotation * *pole;
                *u_dir = rotation * *u_dir;
            }
            Surface::Cylinder {
                root,
                axis,
                radius,
                u_dir,
            } => {
                *root = s.transform_point(root);
                *axis = rotation * *axis;
                *radius *= s.scaling();
                *u_dir = rotation * *u_dir;
            }
        }
    }
}

/// A curve in a surface's parameter space, stored as a 2D polyline running
/// in the direction of the coedge that uses it.
#[derive(Debug, Clone, PartialEq)]
pub struct Pcurve {
    pub points: Vec<Point2<f64>>,
}

impl Pcurve {
    /// Creates a pcurve; `None` with fewer than two points.
    pub fn new(points: Vec<Point2<f64>>) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        Some(Self { points })
    }

    /// Parameter-space length.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    pub fn reversed(&self) -> Self {
        let mut points = self.points.clone();
        points.reverse();
        Self { points }
    }

    /// Splits at fraction `f` of the length, returning both halves in the
    /// same direction.
    pub fn split_at(&self, f: f64) -> (Pcurve, Pcurve) {
        let f = f.clamp(0.0, 1.0);
        let target = self.length() * f;
        let mut walked = 0.0;
        let mut first = vec![self.points[0]];
        for (i, w) in self.points.windows(2).enumerate() {
            let seg = (w[1] - w[0]).norm();
            if walked + seg >= target {
                let local = if seg > 0.0 { (target - walked) / seg } else { 0.0 };
                let cut = w[0] + (w[1] - w[0]) * local;
                first.push(cut);
                let mut second = vec![cut];
                second.extend_from_slice(&self.points[i + 1..]);
                return (Pcurve { points: first }, Pcurve { points: second });
            }
            walked += seg;
            first.push(w[1]);
        }
        let last = *self.points.last().unwrap_or(&self.points[0]);
        (Pcurve { points: first }, Pcurve { points: vec![last, last] })
    }

    /// Returns a copy with every point mapped through `f`.
    pub fn map(&self, f: impl Fn(&Point2<f64>) -> Point2<f64>) -> Self {
        Self {
            points: self.points.iter().map(f).collect(),
        }
    }
}

/// Returns some unit vector perpendicular to `v`.
pub(crate) fn any_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let axis = if v.x.abs() <= v.y.abs() && v.x.abs() <= v.z.abs() {
        Vector3::x()
    } else if v.y.abs() <= v.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    v.cross(&axis).normalize()
}

/// Distance from `p` to the segment `[a, b]`.
pub(crate) fn point_segment_distance(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq <= f64::EPSILON * f64::EPSILON {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn straight_param_is_arc_length() {
        let line = Curve::straight(Point3::origin(), Vector3::new(2.0, 0.0, 0.0)).unwrap();
        let p = line.point(3.0);
        assert_relative_eq!(p.x, 3.0);
        assert_relative_eq!(line.param(&Point3::new(1.5, 4.0, 0.0)), 1.5);
        assert!(!line.is_closed());
    }

    #[test]
    fn degenerate_curves_are_rejected() {
        assert!(Curve::straight(Point3::origin(), Vector3::zeros()).is_none());
        assert!(Curve::circle(Point3::origin(), Vector3::z(), Vector3::z()).is_none());
    }

    #[test]
    fn circle_evaluation_and_inversion() {
        let circle = Curve::circle(Point3::origin(), Vector3::z(), Vector3::new(2.0, 0.0, 0.0))
            .unwrap();
        let p = circle.point(FRAC_PI_2);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-12);
        assert_relative_eq!(circle.param(&Point3::new(0.0, -5.0, 0.0)), 1.5 * PI);
        assert!(circle.is_closed());
        assert_eq!(circle.period(), Some(TAU));
    }

    #[test]
    fn closest_param_respects_range() {
        let line = Curve::straight(Point3::origin(), Vector3::x()).unwrap();
        let range = Some(Interval::new(0.0, 1.0));
        assert_relative_eq!(line.closest_param(&Point3::new(5.0, 1.0, 0.0), range), 1.0);
        assert_relative_eq!(line.distance(&Point3::new(-1.0, 0.0, 0.0), range), 1.0);
    }

    #[test]
    fn closest_param_wraps_periodic_range() {
        let circle =
            Curve::circle(Point3::origin(), Vector3::z(), Vector3::x()).unwrap();
        let range = Some(Interval::new(PI, 3.0 * PI));
        let t = circle.closest_param(&Point3::new(1.0, 0.0, 0.0), range);
        assert_relative_eq!(t, 2.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn plane_round_trip() {
        let plane = Surface::plane_with_u(
            Point3::new(0.0, 0.0, 1.0),
            Vector3::z(),
            Vector3::x(),
        )
        .unwrap();
        let p = Point3::new(0.3, -0.7, 1.0);
        let uv = plane.param(&p);
        let q = plane.point(&uv);
        assert_relative_eq!((p - q).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(plane.normal_at(&p).z, 1.0);
    }

    #[test]
    fn cylinder_and_sphere_round_trip() {
        let cyl = Surface::cylinder(Point3::origin(), Vector3::z(), 2.0).unwrap();
        let p = cyl.point(&Point2::new(0.4, 3.0));
        assert_relative_eq!((cyl.point(&cyl.param(&p)) - p).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(cyl.normal_at(&p).norm(), 1.0, epsilon = 1e-12);

        let sphere = Surface::sphere(Point3::new(1.0, 1.0, 1.0), 3.0).unwrap();
        let q = sphere.point(&Point2::new(1.0, 0.5));
        assert_relative_eq!((q - Point3::new(1.0, 1.0, 1.0)).norm(), 3.0, epsilon = 1e-12);
        assert_relative_eq!((sphere.point(&sphere.param(&q)) - q).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn pcurve_split_preserves_ends() {
        let pc = Pcurve::new(vec![Point2::new(0.0, 0.0), Point2::new(4.0, 0.0)]).unwrap();
        let (a, b) = pc.split_at(0.25);
        assert_relative_eq!(a.points.last().unwrap().x, 1.0);
        assert_relative_eq!(b.points[0].x, 1.0);
        assert_relative_eq!(b.points.last().unwrap().x, 4.0);
        assert_relative_eq!(a.length() + b.length(), 4.0);
    }

    #[test]
    fn similarity_transform_scales_radius() {
        let mut cyl = Surface::cylinder(Point3::origin(), Vector3::z(), 1.0).unwrap();
        let s = Similarity3::from_parts(
            Translation3::new(1.0, 0.0, 0.0),
            UnitQuaternion::identity(),
            2.0,
        );
        cyl.transform(&s);
        match cyl {
            Surface::Cylinder { root, radius, .. } => {
                assert_relative_eq!(root.x, 1.0);
                assert_relative_eq!(radius, 2.0);
            }
            _ => panic!("expected cylinder"),
        }
    }

    #[test]
    fn aabb_union_and_contains() {
        let a = Aabb::from_points([Point3::origin(), Point3::new(1.0, 1.0, 1.0)]).unwrap();
        let b = Aabb::from_point(Point3::new(2.0, -1.0, 0.5));
        let u = a.union(&b);
        assert!(u.contains(&Point3::new(1.5, -0.5, 0.5)));
        assert!(!a.contains(&Point3::new(1.5, 0.0, 0.0)));
        assert!(a.enlarged(0.6).contains(&Point3::new(1.5, 0.0, 0.0)));
        assert!(Aabb::from_points(Vec::new()).is_none());
    }

    #[test]
    fn segment_distance() {
        let d = point_segment_distance(
            &Point3::new(0.5, 0.0005, 0.0),
            &Point3::origin(),
            &Point3::new(1.0, 0.0, 0.0),
        );
        assert_relative_eq!(d, 0.0005, epsilon = 1e-15);
    }
}
