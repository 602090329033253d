use anyhow::{anyhow, Result};
use glam::{Mat4, Vec3};
use log::info;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::cloud::{depth_sorted_indices, PointCloud};
use crate::mesh::TriangleMesh;
use crate::obj::Model;
use crate::sampler::SurfaceSampler;

/// Parameters controlling scene assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Name of the sub-mesh turned into the particle cloud.
    #[serde(default = "default_point_source")]
    pub point_source: String,
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    /// Half-open range the per-point sizes are drawn from.
    #[serde(default = "default_size_range")]
    pub size_range: (f32, f32),
    #[serde(default)]
    pub seed: u64,
    /// Offset applied to the sampled cloud to recenter it on the origin.
    #[serde(default = "default_cloud_offset")]
    pub cloud_offset: Vec3,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            point_source: default_point_source(),
            sample_count: default_sample_count(),
            size_range: default_size_range(),
            seed: 0,
            cloud_offset: default_cloud_offset(),
        }
    }
}

fn default_point_source() -> String {
    "baked".to_string()
}

fn default_sample_count() -> usize {
    7000
}

fn default_size_range() -> (f32, f32) {
    (2.0, 22.0)
}

fn default_cloud_offset() -> Vec3 {
    Vec3::new(-1.0, 0.0, -1.652)
}

/// A sub-mesh rendered as a flat-colored solid next to the cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct Prop {
    pub name: String,
    pub mesh: TriangleMesh,
    pub color: Vec3,
}

/// The assembled scene: particle cloud, draw order and accent props.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalScene {
    pub points: PointCloud,
    /// Back-to-front permutation of the cloud, computed once at setup.
    pub draw_order: Vec<u32>,
    pub props: Vec<Prop>,
}

impl PortalScene {
    /// Builds the scene from a loaded model.
    ///
    /// The configured sub-mesh is sampled into the particle cloud and
    /// recentered; every other sub-mesh becomes a flat-colored prop.  The
    /// draw order is computed against `view_proj` once, here, and reused
    /// for the lifetime of the scene.
    pub fn assemble(model: &Model, config: &SceneConfig, view_proj: Mat4) -> Result<Self> {
        let source = model.mesh(&config.point_source).ok_or_else(|| {
            anyhow!(
                "model does not contain a mesh named '{}'",
                config.point_source
            )
        })?;

        let sampler = SurfaceSampler::build(source)?;
        let mut rng = Pcg32::seed_from_u64(config.seed);
        let mut points = sampler.sample_cloud(config.sample_count, config.size_range, &mut rng)?;
        points.translate(config.cloud_offset);
        info!(
            "sampled {} points from '{}' ({:.3} area units)",
            points.len(),
            config.point_source,
            sampler.total_area()
        );

        let draw_order = depth_sorted_indices(&points, view_proj);

        let props = model
            .meshes
            .iter()
            .filter(|entry| entry.name != config.point_source)
            .map(|entry| Prop {
                name: entry.name.clone(),
                mesh: entry.mesh.clone(),
                color: prop_color(&entry.name, &entry.mesh),
            })
            .collect();

        Ok(Self {
            points,
            draw_order,
            props,
        })
    }
}

/// Material color for a prop, matching the source model's emissive
/// accents.  Pole lanterns get a fixed warm white; anything else averages
/// its baked vertex colors, falling back to white when none were carried.
fn prop_color(name: &str, mesh: &TriangleMesh) -> Vec3 {
    if name.starts_with("poleLight") {
        return Vec3::new(1.0, 1.0, 229.0 / 255.0);
    }
    match &mesh.colors {
        Some(colors) if !colors.is_empty() => {
            colors.iter().copied().sum::<Vec3>() / colors.len() as f32
        }
        _ => Vec3::ONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obj::load_obj_from_str;

    const MODEL: &str = "\
o baked
v 0 0 0 1 1 1
v 1 0 0 1 1 1
v 0 1 0 1 1 1
f 1 2 3
o poleLightA
v 2 0 0
v 3 0 0
v 2 1 0
f 4 5 6
o portalLight
v 4 0 0
v 5 0 0
v 4 1 0
f 7 8 9
";

    fn config(sample_count: usize) -> SceneConfig {
        SceneConfig {
            sample_count,
            cloud_offset: Vec3::ZERO,
            ..SceneConfig::default()
        }
    }

    #[test]
    fn assembles_cloud_and_props() {
        let model = load_obj_from_str(MODEL).unwrap();
        let scene = PortalScene::assemble(&model, &config(100), Mat4::IDENTITY).unwrap();
        assert_eq!(scene.points.len(), 100);
        assert_eq!(scene.draw_order.len(), 100);
        assert_eq!(scene.props.len(), 2);
        assert!(scene.props.iter().all(|p| p.name != "baked"));
    }

    #[test]
    fn draw_order_is_a_permutation() {
        let model = load_obj_from_str(MODEL).unwrap();
        let scene = PortalScene::assemble(&model, &config(64), Mat4::IDENTITY).unwrap();
        let mut order = scene.draw_order.clone();
        order.sort_unstable();
        assert_eq!(order, (0..64).collect::<Vec<u32>>());
    }

    #[test]
    fn recenter_offset_is_applied() {
        let model = load_obj_from_str(MODEL).unwrap();
        let mut shifted = config(50);
        shifted.cloud_offset = Vec3::new(-10.0, 0.0, 0.0);
        let scene = PortalScene::assemble(&model, &shifted, Mat4::IDENTITY).unwrap();
        let (min, max) = scene.points.bounds().unwrap();
        assert!(max.x <= -9.0 + 1e-4);
        assert!(min.x >= -10.0 - 1e-4);
    }

    #[test]
    fn missing_point_source_is_an_error() {
        let model = load_obj_from_str("o other\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        let err = PortalScene::assemble(&model, &config(10), Mat4::IDENTITY).unwrap_err();
        assert!(err.to_string().contains("baked"));
    }

    #[test]
    fn same_seed_reassembles_identically() {
        let model = load_obj_from_str(MODEL).unwrap();
        let first = PortalScene::assemble(&model, &config(32), Mat4::IDENTITY).unwrap();
        let second = PortalScene::assemble(&model, &config(32), Mat4::IDENTITY).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn pole_lights_get_the_warm_material() {
        let mesh = TriangleMesh::default();
        let warm = Vec3::new(1.0, 1.0, 229.0 / 255.0);
        assert_eq!(prop_color("poleLightA", &mesh), warm);
        assert_eq!(prop_color("poleLightB", &mesh), warm);
        assert_eq!(prop_color("portalLight", &mesh), Vec3::ONE);
    }

    #[test]
    fn prop_color_averages_carried_vertex_colors() {
        let mut mesh = TriangleMesh::default();
        mesh.colors = Some(vec![
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]);
        let averaged = prop_color("portalLight", &mesh);
        assert!((averaged - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-6);
        // Pole lanterns keep their fixed material even when colored.
        assert_eq!(
            prop_color("poleLightA", &mesh),
            Vec3::new(1.0, 1.0, 229.0 / 255.0)
        );
    }
}
