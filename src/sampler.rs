use glam::Vec3;
use rand::Rng;
use thiserror::Error;

use crate::cloud::PointCloud;
use crate::mesh::TriangleMesh;

/// Errors produced while building or running the sampler.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SampleError {
    /// The mesh has no triangles or its total surface area is zero.
    #[error("mesh has no usable surface area")]
    InvalidMesh,
    /// The requested sample count is zero (negative counts are barred by
    /// the unsigned type).
    #[error("sample count must be positive")]
    InvalidCount,
}

/// One point sampled from a mesh surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub position: Vec3,
    pub normal: Vec3,
    /// Interpolated vertex color in display (sRGB) space.
    pub color: Vec3,
}

/// Area-weighted random sampler over a triangle mesh.
///
/// Construction precomputes a cumulative-area table; each sample picks a
/// triangle with probability proportional to its area and then a uniform
/// barycentric point inside it.  The random source is injected so that
/// sampling is reproducible under a fixed seed.
pub struct SurfaceSampler<'a> {
    mesh: &'a TriangleMesh,
    cumulative_areas: Vec<f32>,
    total_area: f32,
}

impl<'a> SurfaceSampler<'a> {
    /// Builds the cumulative-area table for `mesh`.
    pub fn build(mesh: &'a TriangleMesh) -> Result<Self, SampleError> {
        let mut cumulative_areas = Vec::with_capacity(mesh.triangle_count());
        let mut total_area = 0.0;
        for i in 0..mesh.triangle_count() {
            total_area += mesh.triangle(i).area();
            cumulative_areas.push(total_area);
        }
        if cumulative_areas.is_empty() || total_area <= 0.0 {
            return Err(SampleError::InvalidMesh);
        }
        Ok(Self {
            mesh,
            cumulative_areas,
            total_area,
        })
    }

    /// Draws one uniformly distributed point from the mesh surface.
    pub fn sample(&self, rng: &mut impl Rng) -> SurfacePoint {
        let pick = rng.random::<f32>() * self.total_area;
        let index = self
            .cumulative_areas
            .partition_point(|&area| area < pick)
            .min(self.cumulative_areas.len() - 1);
        let triangle = self.mesh.triangle(index);

        // Two uniform randoms, reflected across the diagonal so the
        // barycentric point stays inside the triangle.
        let mut u = rng.random::<f32>();
        let mut v = rng.random::<f32>();
        if u + v > 1.0 {
            u = 1.0 - u;
            v = 1.0 - v;
        }
        let w = 1.0 - u - v;
        let weights = [w, u, v];

        let position = interpolate(&triangle.positions, weights);
        let normal = match &triangle.normals {
            Some(normals) => interpolate(normals, weights).normalize_or_zero(),
            None => face_normal(&triangle.positions),
        };
        // Uncolored meshes default to exact white; only real vertex colors
        // go through the display conversion.
        let color = match &triangle.colors {
            Some(colors) => linear_to_srgb(interpolate(colors, weights)),
            None => Vec3::ONE,
        };

        SurfacePoint {
            position,
            normal,
            color,
        }
    }

    /// Samples `count` points into a [`PointCloud`], with per-point sizes
    /// drawn uniformly from `size_range`.
    pub fn sample_cloud(
        &self,
        count: usize,
        size_range: (f32, f32),
        rng: &mut impl Rng,
    ) -> Result<PointCloud, SampleError> {
        if count == 0 {
            return Err(SampleError::InvalidCount);
        }
        let (min_size, max_size) = size_range;
        let mut cloud = PointCloud::with_capacity(count);
        for _ in 0..count {
            let point = self.sample(rng);
            cloud.push(point.position, point.color, rng.random_range(min_size..max_size));
        }
        Ok(cloud)
    }

    pub fn total_area(&self) -> f32 {
        self.total_area
    }
}

fn interpolate(values: &[Vec3; 3], weights: [f32; 3]) -> Vec3 {
    values[0] * weights[0] + values[1] * weights[1] + values[2] * weights[2]
}

fn face_normal(positions: &[Vec3; 3]) -> Vec3 {
    let [a, b, c] = *positions;
    (b - a).cross(c - a).normalize_or_zero()
}

/// Converts one linear color channel to its sRGB display value.
fn channel_to_srgb(value: f32) -> f32 {
    if value <= 0.0031308 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

fn linear_to_srgb(color: Vec3) -> Vec3 {
    Vec3::new(
        channel_to_srgb(color.x),
        channel_to_srgb(color.y),
        channel_to_srgb(color.z),
    )
}
