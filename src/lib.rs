//! Core modules for the portal points scene, a decorative particle
//! rendering of a baked-lit diorama.
//!
//! The crate exposes the building blocks as plain data types and pure
//! functions: a triangle mesh model, an area-weighted surface sampler, a
//! back-to-front depth sorter and the scene assembly that ties them
//! together.  Windowing and GPU submission live behind the `render`
//! module so that everything else stays testable without a device.

pub mod animation;
pub mod camera;
pub mod cloud;
pub mod mesh;
pub mod obj;
pub mod render;
pub mod sampler;
pub mod scene;

pub use animation::IntroTween;
pub use camera::OrbitCamera;
pub use cloud::{depth_sorted_indices, PointCloud};
pub use mesh::TriangleMesh;
pub use obj::{load_obj_from_str, Model, NamedMesh};
pub use render::{CameraParams, Renderer};
pub use sampler::{SampleError, SurfacePoint, SurfaceSampler};
pub use scene::{PortalScene, Prop, SceneConfig};
