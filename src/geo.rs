//! Planar point-in-polygon containment over latitude/longitude rings.
//!
//! Longitude is treated as the x axis and latitude as the y axis. Rings are
//! validated once on construction so that `GeoPolygon::contains` is infallible.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build from a GeoJSON coordinate pair, which is ordered `[lng, lat]`.
    pub fn from_lng_lat(pair: [f64; 2]) -> Self {
        Self::new(pair[1], pair[0])
    }

    fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// A validated simple ring. The last vertex implicitly connects to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPolygon {
    ring: Vec<Position>,
}

impl GeoPolygon {
    pub fn new(vertices: Vec<Position>) -> Result<Self, ValidationError> {
        if let Some(index) = vertices.iter().position(|vertex| !vertex.is_finite()) {
            return Err(ValidationError::NonFiniteCoordinate { index });
        }

        let mut ring = vertices;
        ring.dedup();
        // GeoJSON rings repeat the first vertex at the end.
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }

        if ring.len() < 3 {
            return Err(ValidationError::TooFewVertices {
                vertices: ring.len(),
            });
        }
        if let Some((first_edge, second_edge)) = first_crossing(&ring) {
            return Err(ValidationError::SelfIntersecting {
                first_edge,
                second_edge,
            });
        }
        if signed_area(&ring) == 0.0 {
            return Err(ValidationError::ZeroArea);
        }

        Ok(Self { ring })
    }

    pub fn vertices(&self) -> &[Position] {
        &self.ring
    }

    /// Even-odd ray casting. Points lying exactly on an edge get a
    /// deterministic but unspecified classification.
    pub fn contains(&self, point: Position) -> bool {
        let x = point.longitude;
        let y = point.latitude;
        let n = self.ring.len();

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.ring[i].longitude, self.ring[i].latitude);
            let (xj, yj) = (self.ring[j].longitude, self.ring[j].latitude);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Validate `ring` and test whether `point` lies inside it.
pub fn contains(point: Position, ring: &[Position]) -> Result<bool, ValidationError> {
    let polygon = GeoPolygon::new(ring.to_vec())?;
    Ok(polygon.contains(point))
}

fn signed_area(ring: &[Position]) -> f64 {
    let n = ring.len();
    let mut twice_area = 0.0;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        twice_area += a.longitude * b.latitude - b.longitude * a.latitude;
    }
    twice_area / 2.0
}

// Edge `i` runs from vertex `i` to vertex `i + 1 (mod n)`.
fn first_crossing(ring: &[Position]) -> Option<(usize, usize)> {
    let n = ring.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            if segments_intersect(ring[i], ring[(i + 1) % n], ring[j], ring[(j + 1) % n]) {
                return Some((i, j));
            }
        }
    }
    None
}

fn orientation(a: Position, b: Position, c: Position) -> f64 {
    (b.longitude - a.longitude) * (c.latitude - a.latitude)
        - (b.latitude - a.latitude) * (c.longitude - a.longitude)
}

fn on_segment(a: Position, b: Position, p: Position) -> bool {
    p.longitude >= a.longitude.min(b.longitude)
        && p.longitude <= a.longitude.max(b.longitude)
        && p.latitude >= a.latitude.min(b.latitude)
        && p.latitude <= a.latitude.max(b.latitude)
}

fn segments_intersect(p1: Position, p2: Position, q1: Position, q2: Position) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    let straddles = |a: f64, b: f64| (a > 0.0 && b < 0.0) || (a < 0.0 && b > 0.0);
    if straddles(d1, d2) && straddles(d3, d4) {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Position> {
        vec![
            Position::new(0.0, 0.0),
            Position::new(0.0, 10.0),
            Position::new(10.0, 10.0),
            Position::new(10.0, 0.0),
        ]
    }

    #[test]
    fn point_strictly_inside_square_is_contained() -> Result<(), ValidationError> {
        assert!(contains(Position::new(5.0, 5.0), &square())?);
        assert!(contains(Position::new(0.5, 9.5), &square())?);
        Ok(())
    }

    #[test]
    fn point_far_outside_bounding_box_is_not_contained() -> Result<(), ValidationError> {
        assert!(!contains(Position::new(20.0, 20.0), &square())?);
        assert!(!contains(Position::new(-50.0, 5.0), &square())?);
        Ok(())
    }

    #[test]
    fn concave_notch_is_excluded() -> Result<(), ValidationError> {
        // U shape opening to the north.
        let ring = vec![
            Position::new(0.0, 0.0),
            Position::new(10.0, 0.0),
            Position::new(10.0, 3.0),
            Position::new(2.0, 3.0),
            Position::new(2.0, 7.0),
            Position::new(10.0, 7.0),
            Position::new(10.0, 10.0),
            Position::new(0.0, 10.0),
        ];
        assert!(contains(Position::new(1.0, 5.0), &ring)?);
        assert!(!contains(Position::new(6.0, 5.0), &ring)?);
        assert!(contains(Position::new(6.0, 1.5), &ring)?);
        Ok(())
    }

    #[test]
    fn closing_vertex_is_accepted() -> Result<(), ValidationError> {
        let mut ring = square();
        ring.push(ring[0]);
        let polygon = GeoPolygon::new(ring)?;
        assert_eq!(polygon.vertices().len(), 4);
        assert!(polygon.contains(Position::new(5.0, 5.0)));
        Ok(())
    }

    #[test]
    fn boundary_classification_is_deterministic() -> Result<(), ValidationError> {
        let polygon = GeoPolygon::new(square())?;
        let on_edge = Position::new(0.0, 5.0);
        let first = polygon.contains(on_edge);
        for _ in 0..10 {
            assert_eq!(polygon.contains(on_edge), first);
        }
        Ok(())
    }

    #[test]
    fn too_few_vertices_is_rejected() {
        let ring = vec![Position::new(0.0, 0.0), Position::new(1.0, 1.0)];
        assert_eq!(
            contains(Position::new(0.5, 0.5), &ring),
            Err(ValidationError::TooFewVertices { vertices: 2 })
        );
        assert_eq!(
            GeoPolygon::new(Vec::new()),
            Err(ValidationError::TooFewVertices { vertices: 0 })
        );
    }

    #[test]
    fn collinear_ring_is_rejected() {
        let ring = vec![
            Position::new(0.0, 0.0),
            Position::new(1.0, 1.0),
            Position::new(2.0, 2.0),
        ];
        assert_eq!(GeoPolygon::new(ring), Err(ValidationError::ZeroArea));
    }

    #[test]
    fn bowtie_is_rejected() {
        let ring = vec![
            Position::new(0.0, 0.0),
            Position::new(10.0, 10.0),
            Position::new(10.0, 0.0),
            Position::new(0.0, 10.0),
        ];
        assert!(matches!(
            GeoPolygon::new(ring),
            Err(ValidationError::SelfIntersecting { .. })
        ));
    }

    #[test]
    fn non_finite_vertex_is_rejected() {
        let mut ring = square();
        ring[2] = Position::new(f64::NAN, 1.0);
        assert_eq!(
            GeoPolygon::new(ring),
            Err(ValidationError::NonFiniteCoordinate { index: 2 })
        );
    }

    #[test]
    fn geojson_pairs_swap_axes() {
        let position = Position::from_lng_lat([-46.6, -23.5]);
        assert_eq!(position.latitude, -23.5);
        assert_eq!(position.longitude, -46.6);
    }
}
