use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Fixed-length particle cloud stored as GPU ready attribute buffers.
///
/// Positions and colors are flat arrays of three 32-bit floats per point,
/// sizes one float per point, matching common vertex-buffer conventions.
/// The point count is fixed once sampling finishes; render order is
/// carried separately as a draw-order index (see
/// [`depth_sorted_indices`]).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloud {
    positions: Vec<f32>,
    colors: Vec<f32>,
    sizes: Vec<f32>,
}

impl PointCloud {
    pub fn with_capacity(count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(count * 3),
            colors: Vec::with_capacity(count * 3),
            sizes: Vec::with_capacity(count),
        }
    }

    pub fn push(&mut self, position: Vec3, color: Vec3, size: f32) {
        self.positions
            .extend_from_slice(&[position.x, position.y, position.z]);
        self.colors.extend_from_slice(&[color.x, color.y, color.z]);
        self.sizes.push(size);
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn position(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.positions[index * 3..index * 3 + 3])
    }

    pub fn color(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.colors[index * 3..index * 3 + 3])
    }

    pub fn size(&self, index: usize) -> f32 {
        self.sizes[index]
    }

    /// Raw position buffer, three floats per point.
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    /// Raw color buffer, three floats per point.
    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    /// Raw size buffer, one float per point.
    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    /// Shifts every point by `offset`, used to recenter the cloud.
    pub fn translate(&mut self, offset: Vec3) {
        for chunk in self.positions.chunks_exact_mut(3) {
            chunk[0] += offset.x;
            chunk[1] += offset.y;
            chunk[2] += offset.z;
        }
    }

    /// Axis aligned bounds of the cloud, `None` when empty.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        if self.is_empty() {
            return None;
        }
        let first = self.position(0);
        Some((1..self.len()).fold((first, first), |(min, max), i| {
            let p = self.position(i);
            (min.min(p), max.max(p))
        }))
    }

    /// Smallest and largest per-point size, `None` when empty.
    pub fn size_range(&self) -> Option<(f32, f32)> {
        let first = *self.sizes.first()?;
        Some(self.sizes.iter().fold((first, first), |(min, max), &s| {
            (min.min(s), max.max(s))
        }))
    }
}

/// Computes a back-to-front draw order for the cloud.
///
/// Each position is transformed by the combined view-projection-model
/// matrix and ordered by strictly decreasing clip-space depth, so
/// transparent points composite correctly when drawn farthest first.
/// Always a full recomputation; ties keep insertion order (the sort is
/// stable).  An empty cloud yields an empty index, and degenerate
/// transforms are sorted as-is without validation.
pub fn depth_sorted_indices(cloud: &PointCloud, view_proj_model: Mat4) -> Vec<u32> {
    let mut depths: Vec<(f32, u32)> = (0..cloud.len())
        .map(|i| {
            let projected = view_proj_model.project_point3(cloud.position(i));
            (projected.z, i as u32)
        })
        .collect();
    depths.sort_by(|a, b| b.0.total_cmp(&a.0));
    depths.into_iter().map(|(_, index)| index).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud_at_depths(depths: &[f32]) -> PointCloud {
        let mut cloud = PointCloud::with_capacity(depths.len());
        for &z in depths {
            cloud.push(Vec3::new(0.0, 0.0, z), Vec3::ONE, 4.0);
        }
        cloud
    }

    #[test]
    fn farthest_point_is_drawn_first() {
        // Identity transform: clip depth equals the z coordinate.
        let cloud = cloud_at_depths(&[5.0, 1.0, 3.0]);
        let order = depth_sorted_indices(&cloud, Mat4::IDENTITY);
        assert_eq!(order, vec![0, 2, 1]);
    }

    #[test]
    fn empty_cloud_yields_empty_order() {
        let cloud = PointCloud::default();
        assert_eq!(depth_sorted_indices(&cloud, Mat4::IDENTITY), Vec::<u32>::new());
    }

    #[test]
    fn order_is_a_permutation() {
        let cloud = cloud_at_depths(&[0.3, -2.0, 7.5, 7.5, 0.0]);
        let mut order = depth_sorted_indices(&cloud, Mat4::IDENTITY);
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn sorting_is_deterministic() {
        let cloud = cloud_at_depths(&[1.0, 4.0, 2.0, 4.0]);
        let matrix = Mat4::perspective_rh(1.0, 1.6, 0.1, 100.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        let first = depth_sorted_indices(&cloud, matrix);
        let second = depth_sorted_indices(&cloud, matrix);
        assert_eq!(first, second);
    }

    #[test]
    fn depths_decrease_along_the_order() {
        let cloud = cloud_at_depths(&[0.1, 9.0, -3.0, 4.2, 4.2]);
        let order = depth_sorted_indices(&cloud, Mat4::IDENTITY);
        let depths: Vec<f32> = order
            .iter()
            .map(|&i| cloud.position(i as usize).z)
            .collect();
        assert!(depths.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn ties_keep_insertion_order() {
        let cloud = cloud_at_depths(&[2.0, 2.0, 2.0]);
        assert_eq!(depth_sorted_indices(&cloud, Mat4::IDENTITY), vec![0, 1, 2]);
    }

    #[test]
    fn degenerate_transform_still_yields_a_permutation() {
        let cloud = cloud_at_depths(&[1.0, 2.0, 3.0]);
        let mut order = depth_sorted_indices(&cloud, Mat4::ZERO);
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn translate_shifts_every_point() {
        let mut cloud = cloud_at_depths(&[0.0, 1.0]);
        cloud.translate(Vec3::new(-1.0, 0.0, -1.652));
        assert!((cloud.position(0) - Vec3::new(-1.0, 0.0, -1.652)).length() < 1e-6);
        assert!((cloud.position(1) - Vec3::new(-1.0, 0.0, -0.652)).length() < 1e-6);
    }

    #[test]
    fn bounds_and_size_range_summarise_the_cloud() {
        let mut cloud = PointCloud::with_capacity(2);
        cloud.push(Vec3::new(-1.0, 2.0, 0.0), Vec3::ONE, 3.0);
        cloud.push(Vec3::new(4.0, -5.0, 1.0), Vec3::ONE, 9.0);
        assert_eq!(
            cloud.bounds(),
            Some((Vec3::new(-1.0, -5.0, 0.0), Vec3::new(4.0, 2.0, 1.0)))
        );
        assert_eq!(cloud.size_range(), Some((3.0, 9.0)));
    }
}
