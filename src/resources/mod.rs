//! Loading external content: models, equirectangular images and the
//! environment textures generated from them.
//!
//! Loads never block a frame. Every loader hands out a future; components
//! spawn a task on their viewport's scheduler that awaits it, so finished
//! content lands in the scene at a tick boundary like any other mutation.
//!
//! - [`AssetLoader`] is the seam: [`FileLoader`] reads from disk (or the page
//!   origin on the web), [`memory::MemoryLoader`] serves prepared content
//! - [`ModelData`] is a loaded model, independent of any scene
//! - [`environment::EnvironmentCache`] memoises environment generation

pub mod environment;
pub mod memory;
pub mod mesh;
pub mod texture;

use std::{
    io::{BufReader, Cursor},
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::Context;
use cgmath::{Euler, One, Quaternion, Vector3, Zero};
use futures::{FutureExt, future::LocalBoxFuture};

use crate::{
    data_structures::{
        color::Color,
        geometry::{Geometry, Topology},
        material::{Material, MaterialKind},
        scene_graph::Object3d,
        texture::HdrImage,
    },
    resources::texture::{decode_equirect, load_binary},
};

/// Source of raw bytes by file name.
pub type Fetch = Rc<dyn Fn(String) -> LocalBoxFuture<'static, anyhow::Result<Vec<u8>>>>;

pub trait AssetLoader {
    fn load_model(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<ModelData>>;

    fn load_equirect(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<HdrImage>>;
}

thread_local! {
    static DEFAULT_LOADER: std::cell::RefCell<Option<Rc<dyn AssetLoader>>> = const { std::cell::RefCell::new(None) };
}

/// Loader used by components that were not given one: files below `assets/`.
pub fn default_loader() -> Rc<dyn AssetLoader> {
    DEFAULT_LOADER.with(|slot| {
        slot.borrow_mut()
            .get_or_insert_with(|| -> Rc<dyn AssetLoader> {
                match FileLoader::new("assets") {
                    Ok(loader) => Rc::new(loader),
                    Err(e) => {
                        log::error!("File loading unavailable, assets will be missing: {:#}", e);
                        Rc::new(memory::MemoryLoader::new())
                    }
                }
            })
            .clone()
    })
}

/// Replace the loader handed to components on this thread.
pub fn set_default_loader(loader: Rc<dyn AssetLoader>) {
    DEFAULT_LOADER.with(|slot| *slot.borrow_mut() = Some(loader));
}

/// One drawable part of a model.
#[derive(Clone, Debug)]
pub struct MeshPrimitive {
    pub name: String,
    pub geometry: Rc<Geometry>,
    pub material: Material,
}

#[derive(Clone, Debug)]
pub struct ModelNode {
    pub name: String,
    pub translation: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
    pub primitives: Vec<MeshPrimitive>,
    pub children: Vec<ModelNode>,
}

impl Default for ModelNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            translation: Vector3::zero(),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            primitives: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl ModelNode {
    fn instantiate(&self) -> Object3d {
        let object = Object3d::group().named(self.name.clone());
        let euler = Euler::from(self.rotation);
        object.set_position(self.translation);
        object.set_rotation(Vector3::new(euler.x.0, euler.y.0, euler.z.0));
        object.set_scale(self.scale);
        for primitive in &self.primitives {
            let mesh = Object3d::mesh(primitive.geometry.clone(), primitive.material.clone())
                .named(primitive.name.clone());
            object.add(&mesh);
        }
        for child in &self.children {
            object.add(&child.instantiate());
        }
        object
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a MeshPrimitive>) {
        out.extend(self.primitives.iter());
        for child in &self.children {
            child.collect(out);
        }
    }
}

/// A loaded model, ready to be instantiated any number of times.
#[derive(Clone, Debug, Default)]
pub struct ModelData {
    pub source: String,
    pub roots: Vec<ModelNode>,
}

impl ModelData {
    /// Fresh graph objects for this model under a single group. Geometry is
    /// shared, materials are copied so each instance can fade on its own.
    pub fn instantiate(&self) -> Object3d {
        let root = Object3d::group().named(self.source.clone());
        for node in &self.roots {
            root.add(&node.instantiate());
        }
        root
    }

    /// Every primitive in depth-first node order, node transforms ignored.
    /// Instancing places these itself.
    pub fn primitives(&self) -> Vec<&MeshPrimitive> {
        let mut out = Vec::new();
        for node in &self.roots {
            node.collect(&mut out);
        }
        out
    }
}

/// Loads assets from a directory natively, or from below the page origin on
/// the web. Native reads run on a small tokio runtime owned by the loader.
pub struct FileLoader {
    root: PathBuf,
    #[cfg(not(target_arch = "wasm32"))]
    runtime: Rc<tokio::runtime::Runtime>,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        #[cfg(not(target_arch = "wasm32"))]
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .context("Could not start the asset loading runtime")?;
        Ok(Self {
            root: root.into(),
            #[cfg(not(target_arch = "wasm32"))]
            runtime: Rc::new(runtime),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn fetcher(&self) -> Fetch {
        let root = self.root.clone();
        let runtime = self.runtime.clone();
        Rc::new(move |file_name: String| {
            let root = root.clone();
            let handle = runtime.spawn(async move { load_binary(&root, &file_name).await });
            async move { handle.await.context("Asset loading task failed")? }.boxed_local()
        })
    }

    #[cfg(target_arch = "wasm32")]
    fn fetcher(&self) -> Fetch {
        let root = self.root.clone();
        Rc::new(move |file_name: String| {
            let root = root.clone();
            async move { load_binary(&root, &file_name).await }.boxed_local()
        })
    }
}

impl AssetLoader for FileLoader {
    fn load_model(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<ModelData>> {
        let fetch = self.fetcher();
        let path = path.to_string();
        async move {
            let bytes = fetch(path.clone()).await?;
            load_model_bytes(bytes, &path, relative_to(fetch, &path)).await
        }
        .boxed_local()
    }

    fn load_equirect(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<HdrImage>> {
        let fetch = self.fetcher();
        let path = path.to_string();
        async move {
            let bytes = fetch(path.clone()).await?;
            decode_equirect(&bytes, &path)
        }
        .boxed_local()
    }
}

/// Resolve file names against the directory `file_name` lives in.
fn relative_to(fetch: Fetch, file_name: &str) -> Fetch {
    let dir = Path::new(file_name).parent().map(Path::to_path_buf).unwrap_or_default();
    Rc::new(move |name: String| fetch(dir.join(name).to_string_lossy().into_owned()))
}

/// Parse model bytes by file extension. Side files (buffers, material
/// libraries) come through `fetch`.
pub async fn load_model_bytes(bytes: Vec<u8>, file_name: &str, fetch: Fetch) -> anyhow::Result<ModelData> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("obj") => mesh::load_model_obj(bytes, file_name, fetch).await,
        Some("gltf") | Some("glb") => load_model_gltf(bytes, file_name, fetch).await,
        _ => anyhow::bail!("Unsupported model format: {file_name}"),
    }
}

pub async fn load_model_gltf(bytes: Vec<u8>, file_name: &str, fetch: Fetch) -> anyhow::Result<ModelData> {
    let gltf_reader = BufReader::new(Cursor::new(bytes));
    let gltf = gltf::Gltf::from_reader(gltf_reader).with_context(|| format!("Could not parse {file_name}"))?;

    // Load buffers
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .with_context(|| format!("{file_name} references a missing binary chunk"))?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                anyhow::bail!("Embedded data URIs are not supported ({file_name})");
            }
            gltf::buffer::Source::Uri(uri) => {
                let bin = fetch(uri.to_string()).await?;
                buffer_data.push(bin);
            }
        }
    }

    let materials: Vec<Material> = gltf.materials().map(|m| to_material(&m)).collect();

    let mut roots = Vec::new();
    for scene in gltf.scenes() {
        for node in scene.nodes() {
            roots.push(to_model_node(&node, &buffer_data, &materials));
        }
    }

    Ok(ModelData {
        source: file_name.to_string(),
        roots,
    })
}

fn to_material(material: &gltf::Material) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let mut out = Material::new(
        MaterialKind::Standard {
            metalness: pbr.metallic_factor(),
            roughness: pbr.roughness_factor(),
        },
        Color::new(r, g, b),
    );
    if material.alpha_mode() == gltf::material::AlphaMode::Blend {
        out.set_opacity(a);
    }
    out
}

fn to_model_node(node: &gltf::Node, buffers: &[Vec<u8>], materials: &[Material]) -> ModelNode {
    let (translation, [x, y, z, w], scale) = node.transform().decomposed();
    let primitives = node
        .mesh()
        .map(|mesh| {
            mesh.primitives()
                .filter_map(|primitive| {
                    let name = mesh.name().unwrap_or("mesh").to_string();
                    to_primitive(name, &primitive, buffers, materials)
                })
                .collect()
        })
        .unwrap_or_default();
    ModelNode {
        name: node.name().unwrap_or_default().to_string(),
        translation: translation.into(),
        rotation: Quaternion::new(w, x, y, z),
        scale: scale.into(),
        primitives,
        children: node
            .children()
            .map(|child| to_model_node(&child, buffers, materials))
            .collect(),
    }
}

fn to_primitive(
    name: String,
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
    materials: &[Material],
) -> Option<MeshPrimitive> {
    let topology = match primitive.mode() {
        gltf::mesh::Mode::Triangles => Topology::Triangles,
        gltf::mesh::Mode::Lines => Topology::Lines,
        gltf::mesh::Mode::LineStrip => Topology::LineStrip,
        other => {
            log::warn!("Skipping primitive of {name} with unsupported mode {:?}", other);
            return None;
        }
    };
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
    let Some(positions) = reader.read_positions() else {
        log::warn!("Skipping primitive of {name} without positions");
        return None;
    };
    let positions: Vec<[f32; 3]> = positions.collect();
    let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
    let indices: Option<Vec<u32>> = reader.read_indices().map(|i| i.into_u32().collect());

    let has_normals = normals.as_ref().is_some_and(|n| n.len() == positions.len());
    let vertex_count = positions.len();
    let mut geometry = Geometry::new(
        positions,
        normals.filter(|_| has_normals).unwrap_or_else(|| vec![[0.0; 3]; vertex_count]),
        indices,
        topology,
    );
    if !has_normals {
        geometry.compute_normals();
    }
    let material = primitive
        .material()
        .index()
        .and_then(|i| materials.get(i).cloned())
        .unwrap_or_default();

    Some(MeshPrimitive {
        name,
        geometry: Rc::new(geometry),
        material,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshPrimitive {
        MeshPrimitive {
            name: "tri".into(),
            geometry: Rc::new(Geometry::plane(1.0, 1.0)),
            material: Material::default(),
        }
    }

    #[test]
    fn primitives_are_listed_depth_first() {
        let named = |name: &str| MeshPrimitive {
            name: name.into(),
            ..triangle()
        };
        let model = ModelData {
            source: "nested".into(),
            roots: vec![
                ModelNode {
                    primitives: vec![named("outer")],
                    children: vec![ModelNode {
                        translation: Vector3::new(0.0, 2.0, 0.0),
                        primitives: vec![named("inner")],
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                ModelNode {
                    primitives: vec![named("second")],
                    ..Default::default()
                },
            ],
        };
        let names: Vec<&str> = model.primitives().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["outer", "inner", "second"]);
    }

    #[test]
    fn node_transforms_reach_the_instantiated_graph() {
        let model = ModelData {
            source: "moved".into(),
            roots: vec![ModelNode {
                translation: Vector3::new(1.0, 0.0, 0.0),
                primitives: vec![triangle()],
                ..Default::default()
            }],
        };
        let root = model.instantiate();
        let mesh = root
            .find(&|o: &Object3d| o.geometry().is_some())
            .expect("mesh present");
        assert_eq!(mesh.world_position(), Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn instantiated_models_share_geometry() {
        let model = ModelData {
            source: "flat".into(),
            roots: vec![ModelNode {
                primitives: vec![triangle()],
                ..Default::default()
            }],
        };
        let a = model.instantiate();
        let b = model.instantiate();
        let geometry = |root: &Object3d| {
            root.find(&|o: &Object3d| o.geometry().is_some())
                .and_then(|o| o.geometry())
                .expect("mesh present")
        };
        assert!(Rc::ptr_eq(&geometry(&a), &geometry(&b)));
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let fetch: Fetch = Rc::new(|_: String| async { anyhow::Ok(Vec::<u8>::new()) }.boxed_local());
        let result = futures::executor::block_on(load_model_bytes(Vec::new(), "scene.fbx", fetch));
        assert!(result.is_err());
    }
}
