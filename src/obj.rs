use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};

use crate::mesh::{MeshData, VERTEX_STRIDE};

/// Parses a Wavefront OBJ document into an interleaved, indexed mesh.
///
/// Polygons are fan-triangulated and vertices sharing the same
/// position/uv/normal triple are welded. Normals are computed from the faces
/// when the file does not provide them.
pub fn load_obj_from_str(data: &str) -> Result<MeshData> {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut normals = Vec::new();
    let mut faces: Vec<[FaceIndex; 3]> = Vec::new();

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
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vt" => uvs.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                triangulate_face(&polygon, &mut faces);
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let (mut mesh, authored) = build_mesh(&positions, &uvs, &normals, &faces)?;
    if authored.iter().any(|has_normal| !has_normal) {
        compute_normals(&mut mesh, &authored);
    }
    Ok(mesh)
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut next = || -> Result<f32> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("missing vector component"))?
            .parse::<f32>()?)
    };
    Ok(Vec3::new(next()?, next()?, next()?))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let mut next = || -> Result<f32> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("missing texture coordinate component"))?
            .parse::<f32>()?)
    };
    Ok(Vec2::new(next()?, next()?))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vt = optional_index(segments.next())?;
        let vn = optional_index(segments.next())?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn optional_index(segment: Option<&str>) -> Result<i32> {
    match segment {
        None | Some("") => Ok(0),
        Some(value) => Ok(value.parse::<i32>()?),
    }
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    for i in 1..(polygon.len() - 1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

fn build_mesh(
    positions: &[Vec3],
    uvs: &[Vec2],
    normals: &[Vec3],
    faces: &[[FaceIndex; 3]],
) -> Result<(MeshData, Vec<bool>)> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    // Per welded vertex: whether the file supplied its normal.
    let mut authored = Vec::new();

    for face in faces {
        for idx in face {
            let position =
                fix_index(idx.v, positions.len()).ok_or_else(|| anyhow!("invalid vertex index"))?;
            let key = Key {
                position,
                uv: fix_index(idx.vt, uvs.len()),
                normal: fix_index(idx.vn, normals.len()),
            };
            let next_index = (vertices.len() / VERTEX_STRIDE) as u32;
            let entry = lookup.entry(key).or_insert_with(|| {
                let p = positions[key.position];
                let n = key.normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
                // OBJ puts v = 0 at the bottom; textures are sampled top-down.
                let uv = key
                    .uv
                    .map(|i| Vec2::new(uvs[i].x, 1.0 - uvs[i].y))
                    .unwrap_or(Vec2::ZERO);
                vertices.extend_from_slice(&[p.x, p.y, p.z, n.x, n.y, n.z, uv.x, uv.y]);
                authored.push(key.normal.is_some());
                next_index
            });
            indices.push(*entry);
        }
    }

    Ok((MeshData { vertices, indices }, authored))
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then(|| len - abs)
    } else {
        None
    }
}

/// Fills in face-averaged normals for vertices without an authored one.
fn compute_normals(mesh: &mut MeshData, authored: &[bool]) {
    let mut accum = vec![Vec3::ZERO; mesh.vertex_count()];

    for triangle in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];
        let p0 = mesh.position(i0);
        let normal = (mesh.position(i1) - p0).cross(mesh.position(i2) - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (i, normal) in accum.into_iter().enumerate() {
        if authored[i] {
            continue;
        }
        let normal = normal.normalize_or_zero();
        let base = i * VERTEX_STRIDE + 3;
        mesh.vertices[base..base + 3].copy_from_slice(&normal.to_array());
    }
}
