//! Wavefront OBJ models.

use std::{
    io::{BufReader, Cursor},
    rc::Rc,
};

use anyhow::Context;

use crate::{
    data_structures::{
        color::{Color, srgb_to_linear},
        geometry::{Geometry, Topology},
        material::Material,
    },
    resources::{Fetch, MeshPrimitive, ModelData, ModelNode},
};

/// Parse an OBJ file. Material libraries it references are fetched through
/// `fetch`; a missing library only costs the mesh its colours.
pub async fn load_model_obj(bytes: Vec<u8>, file_name: &str, fetch: Fetch) -> anyhow::Result<ModelData> {
    let mut obj_reader = BufReader::new(Cursor::new(bytes));
    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| {
            let fetch = fetch.clone();
            async move {
                match fetch(p.clone()).await {
                    Ok(mtl) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mtl))),
                    Err(e) => {
                        log::warn!("Material library {p} could not be loaded: {:#}", e);
                        Err(tobj::LoadError::OpenFileFailed)
                    }
                }
            }
        },
    )
    .await
    .with_context(|| format!("Could not parse {file_name}"))?;

    let materials: Vec<Material> = match obj_materials {
        Ok(materials) => materials.iter().map(to_material).collect(),
        Err(e) => {
            log::warn!("{file_name} comes without usable materials: {}", e);
            Vec::new()
        }
    };

    let primitives = models
        .into_iter()
        .filter_map(|m| {
            if m.mesh.positions.is_empty() {
                log::warn!("Skipping empty mesh {} in {}", m.name, file_name);
                return None;
            }
            let positions: Vec<[f32; 3]> = m
                .mesh
                .positions
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]])
                .collect();
            let normals: Vec<[f32; 3]> = (0..positions.len())
                .map(|i| {
                    [
                        m.mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                        m.mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                        m.mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
                    ]
                })
                .collect();
            let mut geometry = Geometry::new(
                positions,
                normals,
                Some(m.mesh.indices.clone()),
                Topology::Triangles,
            );
            if m.mesh.normals.is_empty() {
                geometry.compute_normals();
            }
            let material = m
                .mesh
                .material_id
                .and_then(|id| materials.get(id).cloned())
                .unwrap_or_default();
            Some(MeshPrimitive {
                name: m.name,
                geometry: Rc::new(geometry),
                material,
            })
        })
        .collect();

    Ok(ModelData {
        source: file_name.to_string(),
        roots: vec![ModelNode {
            name: file_name.to_string(),
            primitives,
            ..Default::default()
        }],
    })
}

fn to_material(m: &tobj::Material) -> Material {
    let [r, g, b] = m.diffuse.unwrap_or([1.0, 1.0, 1.0]);
    let mut material = Material::standard(Color::new(
        srgb_to_linear(r),
        srgb_to_linear(g),
        srgb_to_linear(b),
    ));
    if let Some(dissolve) = m.dissolve {
        if dissolve < 1.0 {
            material.set_opacity(dissolve);
        }
    }
    material
}
