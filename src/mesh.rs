//! CPU-side geometry and texture data handed to the backend for upload.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::error::{RenderError, RenderResult};

/// Floats per interleaved vertex: `position.xyz`, `normal.xyz`, `uv.xy`.
pub const VERTEX_STRIDE: usize = 8;

/// Interleaved triangle mesh ready for upload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn position(&self, vertex: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[vertex * VERTEX_STRIDE..vertex * VERTEX_STRIDE + 3])
    }

    /// Half size of the axis-aligned bounds around the origin.
    pub fn half_extents(&self) -> Vec3 {
        (0..self.vertex_count())
            .map(|vertex| self.position(vertex).abs())
            .fold(Vec3::ZERO, Vec3::max)
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3, uv: [f32; 2]) -> u32 {
        let index = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&[
            position.x, position.y, position.z, normal.x, normal.y, normal.z, uv[0], uv[1],
        ]);
        index
    }

    /// Axis-aligned cube centred on the origin with per-face normals and uvs.
    pub fn cube(half_extent: f32) -> Self {
        const FACES: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];

        let mut mesh = Self::default();
        for (normal, right, up) in FACES {
            let corners = [
                (-1.0, -1.0, [0.0, 1.0]),
                (1.0, -1.0, [1.0, 1.0]),
                (1.0, 1.0, [1.0, 0.0]),
                (-1.0, 1.0, [0.0, 0.0]),
            ];
            let base = mesh.vertex_count() as u32;
            for (u, v, uv) in corners {
                let position = (normal + right * u + up * v) * half_extent;
                mesh.push_vertex(position, normal, uv);
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// UV sphere centred on the origin.
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = Self::default();

        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let polar = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let azimuth = u * TAU;
                let normal = Vec3::new(
                    polar.sin() * azimuth.cos(),
                    polar.cos(),
                    polar.sin() * azimuth.sin(),
                );
                mesh.push_vertex(normal * radius, normal, [u, v]);
            }
        }

        let row = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * row + segment;
                let b = a + row;
                mesh.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        mesh
    }
}

/// Decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Checks that `pixels` holds exactly `width * height` RGBA8 texels.
    pub fn validate(&self) -> RenderResult<()> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.pixels.len() != expected {
            return Err(RenderError::Gpu(format!(
                "texture {}x{} carries {} bytes, expected {expected}",
                self.width,
                self.height,
                self.pixels.len()
            )));
        }
        Ok(())
    }

    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: color.to_vec(),
        }
    }

    /// Two-colour checkerboard of `cells` by `cells` squares, 8 texels each.
    pub fn checker(cells: u32, dark: [u8; 4], light: [u8; 4]) -> Self {
        let cells = cells.max(1);
        let size = cells * 8;
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let color = if (x / 8 + y / 8) % 2 == 0 { light } else { dark };
                pixels.extend_from_slice(&color);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_six_quads() {
        let cube = MeshData::cube(1.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.half_extents(), Vec3::ONE);
    }

    #[test]
    fn cube_faces_wind_counter_clockwise_outward() {
        let cube = MeshData::cube(0.5);
        for triangle in cube.indices.chunks_exact(3) {
            let p0 = cube.position(triangle[0] as usize);
            let p1 = cube.position(triangle[1] as usize);
            let p2 = cube.position(triangle[2] as usize);
            let centroid = (p0 + p1 + p2) / 3.0;
            assert!((p1 - p0).cross(p2 - p0).dot(centroid) > 0.0);
        }
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let sphere = MeshData::sphere(2.0, 12, 8);
        assert_eq!(sphere.vertex_count(), 13 * 9);
        assert_eq!(sphere.index_count(), 12 * 8 * 6);
        for vertex in 0..sphere.vertex_count() {
            assert!((sphere.position(vertex).length() - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn texture_validation_checks_byte_count() {
        assert!(TextureData::solid([1, 2, 3, 4]).validate().is_ok());
        let short = TextureData {
            width: 2,
            height: 2,
            pixels: vec![0; 12],
        };
        assert!(short.validate().is_err());
        let empty = TextureData {
            width: 0,
            height: 1,
            pixels: Vec::new(),
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn checker_alternates_cells() {
        let texture = TextureData::checker(2, [0, 0, 0, 255], [255, 255, 255, 255]);
        assert_eq!((texture.width, texture.height), (16, 16));
        assert_eq!(&texture.pixels[0..4], &[255, 255, 255, 255]);
        let second_cell = 8 * 4;
        assert_eq!(&texture.pixels[second_cell..second_cell + 4], &[0, 0, 0, 255]);
    }
}
