//! Asset loading: shader text, OBJ meshes, decoded images and procedural
//! primitives.
//!
//! Loading is split into fetch (async file read), decode (OBJ parse, image
//! decode) and upload, which the engine performs when the asset is spawned.

use std::path::{Path, PathBuf};

use glam::Vec3;
use image::GenericImageView;
use log::debug;

use crate::config::{PrimitiveConfig, ProgramPaths, Shape, ShaderPaths};
use crate::error::AssetLoadError;
use crate::mesh::{MeshData, TextureData};
use crate::obj::load_obj_from_str;
use crate::render::{ProgramSources, ShaderSources};

const PRIMITIVE_HALF_EXTENT: f32 = 0.5;
const SPHERE_SEGMENTS: u32 = 24;
const SPHERE_RINGS: u32 = 16;
const CHECKER_CELLS: u32 = 4;

/// Decoded mesh and texture ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAsset {
    pub name: String,
    pub mesh: MeshData,
    pub texture: TextureData,
}

impl ModelAsset {
    /// Half size of the mesh bounds after scaling.
    pub fn half_extents(&self, scale: Vec3) -> Vec3 {
        self.mesh.half_extents() * scale.abs()
    }
}

/// Generated stand-in for a loaded model: unit cube or sphere with a tinted
/// checker texture.
pub fn primitive_model(primitive: &PrimitiveConfig) -> ModelAsset {
    let mesh = match primitive.shape {
        Shape::Cube => MeshData::cube(PRIMITIVE_HALF_EXTENT),
        Shape::Sphere => MeshData::sphere(PRIMITIVE_HALF_EXTENT, SPHERE_SEGMENTS, SPHERE_RINGS),
    };
    let [r, g, b, a] = primitive.color;
    let shade = |channel: u8| (channel as f32 * 0.6) as u8;
    ModelAsset {
        name: primitive.name.clone(),
        mesh,
        texture: TextureData::checker(CHECKER_CELLS, [shade(r), shade(g), shade(b), a], primitive.color),
    }
}

/// Reads assets relative to a root directory.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    root: PathBuf,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Reads an already resolved path. The read is the suspension point of
    /// every load.
    async fn read_bytes(path: &Path) -> Result<Vec<u8>, AssetLoadError> {
        tokio::fs::read(path)
            .await
            .map_err(|err| AssetLoadError::new(path, err))
    }

    async fn read_text(path: &Path) -> Result<String, AssetLoadError> {
        let bytes = Self::read_bytes(path).await?;
        String::from_utf8(bytes).map_err(|err| AssetLoadError::new(path, err))
    }

    /// Reads a UTF-8 text file such as shader source.
    pub async fn load_text(&self, path: impl AsRef<Path>) -> Result<String, AssetLoadError> {
        Self::read_text(&self.resolve(path.as_ref())).await
    }

    pub async fn load_mesh(&self, path: impl AsRef<Path>) -> Result<MeshData, AssetLoadError> {
        let resolved = self.resolve(path.as_ref());
        let text = Self::read_text(&resolved).await?;
        let mesh = load_obj_from_str(&text).map_err(|err| AssetLoadError::new(&resolved, err))?;
        if mesh.indices.is_empty() {
            return Err(AssetLoadError::new(&resolved, "mesh has no faces"));
        }
        debug!(
            "loaded {} ({} vertices, {} indices)",
            resolved.display(),
            mesh.vertex_count(),
            mesh.index_count()
        );
        Ok(mesh)
    }

    pub async fn load_texture(&self, path: impl AsRef<Path>) -> Result<TextureData, AssetLoadError> {
        let resolved = self.resolve(path.as_ref());
        let bytes = Self::read_bytes(&resolved).await?;
        decode_image(&bytes).map_err(|reason| AssetLoadError::new(&resolved, reason))
    }

    /// Fetches and decodes a mesh and its colour texture. The model is named
    /// after the mesh file.
    pub async fn load_model(
        &self,
        mesh_path: impl AsRef<Path>,
        texture_path: impl AsRef<Path>,
    ) -> Result<ModelAsset, AssetLoadError> {
        let mesh_path = mesh_path.as_ref();
        let mesh = self.load_mesh(mesh_path).await?;
        let texture = self.load_texture(texture_path).await?;
        let name = mesh_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| mesh_path.display().to_string());
        Ok(ModelAsset {
            name,
            mesh,
            texture,
        })
    }

    /// Reads the source text of both programs.
    pub async fn load_programs(&self, paths: &ShaderPaths) -> Result<ProgramSources, AssetLoadError> {
        Ok(ProgramSources {
            lit: self.load_program("lit", &paths.lit).await?,
            depth: self.load_program("depth", &paths.depth).await?,
        })
    }

    async fn load_program(
        &self,
        label: &str,
        paths: &ProgramPaths,
    ) -> Result<ShaderSources, AssetLoadError> {
        let vertex = self.load_text(&paths.vertex).await?;
        let fragment = self.load_text(&paths.fragment).await?;
        Ok(ShaderSources::new(label, vertex, fragment))
    }
}

/// Decodes PNG or JPEG bytes into RGBA8.
pub fn decode_image(bytes: &[u8]) -> Result<TextureData, image::ImageError> {
    let image = image::load_from_memory(bytes)?;
    let (width, height) = image.dimensions();
    Ok(TextureData {
        width,
        height,
        pixels: image.to_rgba8().into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    const TRIANGLE: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nf 1/1 2/2 3/3\n";

    fn write_png(path: &Path) {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([0, 0, 255, 128]));
        image.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[tokio::test]
    async fn loads_model_from_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tri.obj"), TRIANGLE).unwrap();
        write_png(&dir.path().join("tri.png"));

        let loader = AssetLoader::new(dir.path());
        let model = loader.load_model("tri.obj", "tri.png").await.unwrap();
        assert_eq!(model.name, "tri");
        assert_eq!(model.mesh.index_count(), 3);
        assert_eq!((model.texture.width, model.texture.height), (2, 1));
        assert_eq!(model.texture.pixels, vec![255, 0, 0, 255, 0, 0, 255, 128]);
    }

    #[tokio::test]
    async fn relative_root_is_joined_once() {
        let dir = tempfile::Builder::new().tempdir_in(".").unwrap();
        let root = dir.path().strip_prefix(".").unwrap_or(dir.path());
        assert!(root.is_relative());
        fs::write(root.join("a.txt"), "hello").unwrap();

        let loader = AssetLoader::new(root);
        assert_eq!(loader.load_text("a.txt").await.unwrap(), "hello");
        let err = loader.load_text("missing.txt").await.unwrap_err();
        assert_eq!(err.path, root.join("missing.txt"));
    }

    #[tokio::test]
    async fn missing_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let loader = AssetLoader::new(dir.path());
        let err = loader.load_text("shaders/missing.wgsl").await.unwrap_err();
        assert_eq!(err.path, dir.path().join("shaders/missing.wgsl"));
    }

    #[tokio::test]
    async fn undecodable_image_is_an_asset_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.png"), b"not an image").unwrap();
        let loader = AssetLoader::new(dir.path());
        let err = loader.load_texture("bad.png").await.unwrap_err();
        assert_eq!(err.path, dir.path().join("bad.png"));
        assert!(!err.reason.is_empty());
    }

    #[tokio::test]
    async fn faceless_mesh_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("points.obj"), "v 0 0 0\nv 1 0 0\n").unwrap();
        let loader = AssetLoader::new(dir.path());
        let err = loader.load_mesh("points.obj").await.unwrap_err();
        assert!(err.reason.contains("no faces"));
    }

    #[tokio::test]
    async fn loads_program_sources() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.vert", "a.frag", "b.vert", "b.frag"] {
            fs::write(dir.path().join(name), format!("// {name}")).unwrap();
        }
        let paths = ShaderPaths {
            lit: ProgramPaths {
                vertex: "a.vert".into(),
                fragment: "a.frag".into(),
            },
            depth: ProgramPaths {
                vertex: "b.vert".into(),
                fragment: "b.frag".into(),
            },
        };
        let sources = AssetLoader::new(dir.path()).load_programs(&paths).await.unwrap();
        assert_eq!(sources.lit.fragment, "// a.frag");
        assert_eq!(sources.depth.label, "depth");
    }

    #[test]
    fn primitives_carry_tinted_checker() {
        let primitive = PrimitiveConfig::new("Ball", Shape::Sphere, Vec3::ZERO);
        let model = primitive_model(&primitive);
        assert_eq!(model.name, "Ball");
        assert_eq!(model.mesh.index_count(), SPHERE_SEGMENTS * SPHERE_RINGS * 6);
        assert_eq!(&model.texture.pixels[0..4], &primitive.color);
        let half = model.half_extents(Vec3::new(2.0, 1.0, 1.0));
        assert!((half.x - 1.0).abs() < 1e-4);
    }
}
