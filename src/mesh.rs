use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Immutable triangulated surface with optional per-vertex attributes.
///
/// Positions and triangle indices are always present; vertex colors and
/// normals are carried only when the source file defines them.  The mesh
/// is read-only to the sampler and the renderer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<Vec3>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<Vec3>>,
}

impl TriangleMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Returns the vertices of triangle `index`, with whatever attributes
    /// the mesh carries interpolation-ready.
    pub fn triangle(&self, index: usize) -> Triangle {
        let base = index * 3;
        let corners = [
            self.indices[base] as usize,
            self.indices[base + 1] as usize,
            self.indices[base + 2] as usize,
        ];
        Triangle {
            positions: corners.map(|i| self.positions[i]),
            colors: self
                .colors
                .as_ref()
                .map(|colors| corners.map(|i| colors[i])),
            normals: self
                .normals
                .as_ref()
                .map(|normals| corners.map(|i| normals[i])),
        }
    }

    /// Sum of all triangle areas.
    pub fn surface_area(&self) -> f32 {
        (0..self.triangle_count())
            .map(|i| self.triangle(i).area())
            .sum()
    }

    /// Axis aligned bounds of the vertex positions, `None` when empty.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(self.positions.iter().fold((first, first), |(min, max), &p| {
            (min.min(p), max.max(p))
        }))
    }
}

/// One triangle lifted out of a [`TriangleMesh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub positions: [Vec3; 3],
    pub colors: Option<[Vec3; 3]>,
    pub normals: Option<[Vec3; 3]>,
}

impl Triangle {
    pub fn area(&self) -> f32 {
        let [a, b, c] = self.positions;
        (b - a).cross(c - a).length() * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_right_triangle() -> TriangleMesh {
        TriangleMesh {
            positions: vec![
                Vec3::ZERO,
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            indices: vec![0, 1, 2],
            colors: None,
            normals: None,
        }
    }

    #[test]
    fn triangle_area_matches_half_base_times_height() {
        let mesh = unit_right_triangle();
        assert!((mesh.triangle(0).area() - 0.5).abs() < 1e-6);
        assert!((mesh.surface_area() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn triangle_lifts_vertex_colors() {
        let mut mesh = unit_right_triangle();
        mesh.colors = Some(vec![Vec3::X, Vec3::Y, Vec3::Z]);
        let triangle = mesh.triangle(0);
        assert_eq!(triangle.colors, Some([Vec3::X, Vec3::Y, Vec3::Z]));
        assert_eq!(triangle.normals, None);
    }

    #[test]
    fn bounds_cover_all_vertices() {
        let mesh = unit_right_triangle();
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Vec3::ZERO);
        assert_eq!(max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn empty_mesh_has_no_bounds() {
        assert_eq!(TriangleMesh::default().bounds(), None);
    }
}
