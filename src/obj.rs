use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::mesh::TriangleMesh;

/// A named sub-mesh as it appears in the source model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NamedMesh {
    pub name: String,
    pub mesh: TriangleMesh,
}

/// All sub-meshes of a loaded model, in file order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Model {
    pub meshes: Vec<NamedMesh>,
}

impl Model {
    /// Finds a sub-mesh by its object name.
    pub fn mesh(&self, name: &str) -> Option<&TriangleMesh> {
        self.meshes
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.mesh)
    }
}

/// Parses an OBJ file from memory into named triangle meshes.
///
/// Supports the common vertex-color extension where a `v` line carries
/// `x y z r g b`.  Faces are grouped into sub-meshes by the most recent
/// `o` statement; faces before any `o` land in a mesh named `default`.
pub fn load_obj_from_str(data: &str) -> Result<Model> {
    let mut positions = Vec::new();
    let mut colors: Vec<Option<Vec3>> = Vec::new();
    let mut normals = Vec::new();
    let mut groups: Vec<(String, Vec<[FaceIndex; 3]>)> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => {
                let (position, color) = parse_vertex(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?;
                positions.push(position);
                colors.push(color);
            }
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "o" => {
                let name = parts.next().unwrap_or("default").to_string();
                groups.push((name, Vec::new()));
            }
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                if groups.is_empty() {
                    groups.push(("default".to_string(), Vec::new()));
                }
                let faces = &mut groups.last_mut().expect("group exists").1;
                triangulate_face(&polygon, faces);
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let has_colors = colors.iter().any(Option::is_some);
    let mut meshes = Vec::new();
    for (name, faces) in groups {
        if faces.is_empty() {
            continue;
        }
        let mesh = build_mesh(&positions, &colors, has_colors, &normals, &faces)
            .with_context(|| format!("failed to assemble mesh {name}"))?;
        meshes.push(NamedMesh { name, mesh });
    }

    Ok(Model { meshes })
}

fn parse_vertex<'a>(parts: impl Iterator<Item = &'a str>) -> Result<(Vec3, Option<Vec3>)> {
    let numbers = parts
        .map(|part| part.parse::<f32>())
        .collect::<Result<Vec<f32>, _>>()?;
    match numbers.len() {
        3 => Ok((Vec3::from_slice(&numbers), None)),
        6 => Ok((
            Vec3::from_slice(&numbers[..3]),
            Some(Vec3::from_slice(&numbers[3..])),
        )),
        other => Err(anyhow!("expected 3 or 6 components, found {other}")),
    }
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    let y = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    let z = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    Ok(Vec3::new(x, y, z))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vn = segments
            .nth(1)
            .map(|s| if s.is_empty() { 0 } else { s.parse::<i32>().unwrap_or(0) })
            .unwrap_or(0);
        indices.push(FaceIndex { v, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    if polygon.len() < 3 {
        return;
    }
    for i in 1..(polygon.len() - 1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vn: i32,
}

fn build_mesh(
    positions: &[Vec3],
    colors: &[Option<Vec3>],
    has_colors: bool,
    normals: &[Vec3],
    faces: &[[FaceIndex; 3]],
) -> Result<TriangleMesh> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut mesh = TriangleMesh {
        colors: has_colors.then(Vec::new),
        ..TriangleMesh::default()
    };
    let mut has_normals = false;

    for face in faces {
        for idx in face {
            let pos_index =
                fix_index(idx.v, positions.len()).ok_or_else(|| anyhow!("invalid vertex index"))?;
            let normal_index = fix_index(idx.vn, normals.len());
            has_normals |= normal_index.is_some();
            let key = Key {
                position: pos_index,
                normal: normal_index,
            };
            let next_index = mesh.positions.len() as u32;
            let entry = lookup.entry(key).or_insert_with(|| {
                mesh.positions.push(positions[pos_index]);
                if let Some(mesh_colors) = mesh.colors.as_mut() {
                    // Uncolored vertices in a colored file fall back to white.
                    mesh_colors.push(colors[pos_index].unwrap_or(Vec3::ONE));
                }
                next_index
            });
            mesh.indices.push(*entry);
        }
    }

    if has_normals {
        let mut mesh_normals = vec![Vec3::ZERO; mesh.positions.len()];
        lookup.iter().for_each(|(key, &index)| {
            if let Some(normal_index) = key.normal {
                mesh_normals[index as usize] = normals[normal_index];
            }
        });
        mesh.normals = Some(mesh_normals);
    }

    Ok(mesh)
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = (-index) as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let model = load_obj_from_str(obj).unwrap();
        assert_eq!(model.meshes.len(), 1);
        let mesh = &model.meshes[0].mesh;
        assert_eq!(model.meshes[0].name, "default");
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertex_count(), 3);
        assert!(mesh.colors.is_none());
    }

    #[test]
    fn parses_vertex_colors() {
        let obj = "v 0 0 0 1 0 0\nv 1 0 0 0 1 0\nv 0 1 0 0 0 1\nf 1 2 3\n";
        let model = load_obj_from_str(obj).unwrap();
        let mesh = &model.meshes[0].mesh;
        let colors = mesh.colors.as_ref().unwrap();
        assert_eq!(colors[0], Vec3::X);
        assert_eq!(colors[1], Vec3::Y);
        assert_eq!(colors[2], Vec3::Z);
    }

    #[test]
    fn splits_objects_by_name() {
        let obj = "\
o baked
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o poleLightA
v 0 0 1
v 1 0 1
v 0 1 1
f 4 5 6
";
        let model = load_obj_from_str(obj).unwrap();
        assert_eq!(model.meshes.len(), 2);
        assert!(model.mesh("baked").is_some());
        assert!(model.mesh("poleLightA").is_some());
        assert!(model.mesh("portalLight").is_none());
        assert_eq!(model.mesh("baked").unwrap().triangle_count(), 1);
    }

    #[test]
    fn quads_are_triangulated() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let model = load_obj_from_str(obj).unwrap();
        assert_eq!(model.meshes[0].mesh.triangle_count(), 2);
    }

    #[test]
    fn carries_normals_through_face_indices() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n";
        let model = load_obj_from_str(obj).unwrap();
        let normals = model.meshes[0].mesh.normals.as_ref().unwrap();
        assert!(normals.iter().all(|&n| n == Vec3::Z));
    }

    #[test]
    fn rejects_empty_files() {
        assert!(load_obj_from_str("# nothing here\n").is_err());
    }

    #[test]
    fn rejects_malformed_vertices() {
        assert!(load_obj_from_str("v 0 0\n").is_err());
    }
}
