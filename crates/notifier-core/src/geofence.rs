//! Named polygonal regions and point containment.
//!
//! Each [`Geofence`] stores its vertex ring and a bounding box computed once
//! at construction. [`Geofence::locate`] rejects points outside the box
//! before running the ray-casting test against the polygon.
//!
//! # Boundary semantics
//!
//! - The bounding-box check is exclusive on both edges: a point whose
//!   latitude or longitude equals the box minimum or maximum is outside.
//!   Since every box edge touches the polygon, such points lie on the
//!   polygon boundary, so boundary points on the box are consistently
//!   excluded.
//! - Points on polygon edges strictly inside the box follow the half-open
//!   crossing rule of the ray-casting test (an edge counts when exactly one
//!   endpoint lies above the point's latitude).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Errors raised when a geofence definition is unusable.
#[derive(Debug, thiserror::Error)]
pub enum GeofenceError {
    /// A polygon needs at least three vertices.
    #[error("geofence {name} has {count} vertices, need at least 3")]
    TooFewVertices {
        /// The geofence name.
        name: String,
        /// How many vertices were supplied.
        count: usize,
    },

    /// A vertex has a NaN or infinite coordinate.
    #[error("geofence {name} has a non-finite vertex")]
    NonFiniteVertex {
        /// The geofence name.
        name: String,
    },
}

/// A latitude/longitude pair. Serialized as `[lat, lon]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}

impl From<Coordinate> for (f64, f64) {
    fn from(c: Coordinate) -> Self {
        (c.lat, c.lon)
    }
}

/// Axis-aligned bounds of a polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Smallest latitude.
    pub min_lat: f64,
    /// Smallest longitude.
    pub min_lon: f64,
    /// Largest latitude.
    pub max_lat: f64,
    /// Largest longitude.
    pub max_lon: f64,
}

impl BoundingBox {
    fn around(points: &[Coordinate]) -> Option<Self> {
        let first = points.first()?;
        let init = Self {
            min_lat: first.lat,
            min_lon: first.lon,
            max_lat: first.lat,
            max_lon: first.lon,
        };
        Some(points.iter().fold(init, |b, p| Self {
            min_lat: b.min_lat.min(p.lat),
            min_lon: b.min_lon.min(p.lon),
            max_lat: b.max_lat.max(p.lat),
            max_lon: b.max_lon.max(p.lon),
        }))
    }

    /// Whether the point lies strictly inside the box.
    pub fn strictly_contains(&self, lat: f64, lon: f64) -> bool {
        lat > self.min_lat && lat < self.max_lat && lon > self.min_lon && lon < self.max_lon
    }
}

/// Result of locating a point relative to a geofence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Rejected by the bounding box; the polygon was never consulted.
    OutsideBounds,
    /// Inside the box but outside the polygon.
    OutsidePolygon,
    /// Inside the polygon.
    Inside,
}

/// A named polygon with a precomputed bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    name: String,
    polygon: Vec<Coordinate>,
    bounds: BoundingBox,
}

impl Geofence {
    /// Build a geofence from an ordered vertex ring (closing edge implied).
    ///
    /// # Errors
    ///
    /// Returns [`GeofenceError`] if fewer than three vertices are given or
    /// any vertex is not finite.
    pub fn new(name: &str, polygon: Vec<Coordinate>) -> Result<Self, GeofenceError> {
        if polygon.len() < 3 {
            return Err(GeofenceError::TooFewVertices {
                name: name.to_owned(),
                count: polygon.len(),
            });
        }
        if polygon
            .iter()
            .any(|p| !p.lat.is_finite() || !p.lon.is_finite())
        {
            return Err(GeofenceError::NonFiniteVertex {
                name: name.to_owned(),
            });
        }
        let bounds = BoundingBox::around(&polygon).ok_or_else(|| GeofenceError::TooFewVertices {
            name: name.to_owned(),
            count: 0,
        })?;
        Ok(Self {
            name: name.to_owned(),
            polygon,
            bounds,
        })
    }

    /// The geofence name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The precomputed bounding box.
    pub const fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Classify a point.
    pub fn locate(&self, lat: f64, lon: f64) -> Containment {
        if !self.bounds.strictly_contains(lat, lon) {
            return Containment::OutsideBounds;
        }
        if self.polygon_contains(lat, lon) {
            Containment::Inside
        } else {
            Containment::OutsidePolygon
        }
    }

    /// Whether the point is inside the polygon.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.locate(lat, lon) == Containment::Inside
    }

    /// Ray casting along increasing longitude.
    fn polygon_contains(&self, lat: f64, lon: f64) -> bool {
        let next = self.polygon.iter().skip(1).chain(self.polygon.first());
        let mut inside = false;
        for (a, b) in self.polygon.iter().zip(next) {
            if (a.lat > lat) != (b.lat > lat) {
                let crossing = (b.lon - a.lon) * (lat - a.lat) / (b.lat - a.lat) + a.lon;
                if lon < crossing {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

/// All configured geofences, by name.
#[derive(Debug, Clone, Default)]
pub struct GeofenceIndex {
    fences: HashMap<String, Geofence>,
}

impl GeofenceIndex {
    /// Build an index. A later fence with a duplicate name replaces the earlier one.
    pub fn new(fences: impl IntoIterator<Item = Geofence>) -> Self {
        Self {
            fences: fences
                .into_iter()
                .map(|f| (f.name.clone(), f))
                .collect(),
        }
    }

    /// Whether the point lies inside the named geofence.
    ///
    /// An unknown name is a configuration problem, not a pipeline failure:
    /// it is logged and treated as "not inside".
    pub fn contains(&self, name: &str, lat: f64, lon: f64) -> bool {
        let Some(fence) = self.fences.get(name) else {
            warn!(geofence = name, "geofence not found, treating as no match");
            return false;
        };
        fence.contains(lat, lon)
    }

    /// Number of geofences.
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate { lat, lon }
    }

    fn square() -> Geofence {
        Geofence::new(
            "square",
            vec![c(0.0, 0.0), c(0.0, 10.0), c(10.0, 10.0), c(10.0, 0.0)],
        )
        .unwrap()
    }

    /// An L shape: the upper-right quadrant of the 10x10 square is cut out.
    fn ell() -> Geofence {
        Geofence::new(
            "ell",
            vec![
                c(0.0, 0.0),
                c(0.0, 10.0),
                c(5.0, 10.0),
                c(5.0, 5.0),
                c(10.0, 5.0),
                c(10.0, 0.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn bounds_are_precomputed() {
        let fence = ell();
        assert_eq!(
            *fence.bounds(),
            BoundingBox {
                min_lat: 0.0,
                min_lon: 0.0,
                max_lat: 10.0,
                max_lon: 10.0,
            }
        );
    }

    #[test]
    fn interior_point_is_inside() {
        assert_eq!(square().locate(5.0, 5.0), Containment::Inside);
        assert!(ell().contains(2.0, 8.0));
    }

    #[test]
    fn point_outside_box_never_reaches_polygon() {
        assert_eq!(square().locate(11.0, 5.0), Containment::OutsideBounds);
        assert_eq!(square().locate(5.0, -0.1), Containment::OutsideBounds);
    }

    #[test]
    fn box_edges_are_excluded() {
        let fence = square();
        for (lat, lon) in [(0.0, 5.0), (10.0, 5.0), (5.0, 0.0), (5.0, 10.0), (0.0, 0.0)] {
            assert_eq!(
                fence.locate(lat, lon),
                Containment::OutsideBounds,
                "({lat}, {lon}) should be excluded"
            );
        }
    }

    #[test]
    fn concave_notch_is_outside_polygon() {
        assert_eq!(ell().locate(8.0, 8.0), Containment::OutsidePolygon);
    }

    #[test]
    fn too_few_vertices_rejected() {
        let result = Geofence::new("line", vec![c(0.0, 0.0), c(1.0, 1.0)]);
        assert!(matches!(
            result,
            Err(GeofenceError::TooFewVertices { count: 2, .. })
        ));
    }

    #[test]
    fn non_finite_vertex_rejected() {
        let result = Geofence::new("nan", vec![c(0.0, 0.0), c(f64::NAN, 1.0), c(1.0, 0.0)]);
        assert!(matches!(result, Err(GeofenceError::NonFiniteVertex { .. })));
    }

    #[test]
    fn index_unknown_name_is_false() {
        let index = GeofenceIndex::new([square()]);
        assert!(index.contains("square", 5.0, 5.0));
        assert!(!index.contains("missing", 5.0, 5.0));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn coordinate_deserializes_from_pair() {
        let point: Coordinate = serde_json::from_str("[52.5, 13.4]").unwrap();
        assert_eq!(point, c(52.5, 13.4));
    }
}
