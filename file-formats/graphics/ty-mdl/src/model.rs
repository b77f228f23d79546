//! Model assembly
//!
//! Ties the header parser, the geometry decoders and the strip assembler
//! together into the shape a renderer or exporter consumes: per mesh a
//! vertex array, an indexed triangle list and a material name, plus
//! model-level bounds, colliders and bones.

use crate::error::Result;
use crate::geometry::{self, DecodeOptions, DecodeReport};
use crate::header::{self, InlineModel, ModelHeader};
use crate::strip;
use crate::types::{Bone, BoundingBox, Collider, GeometryVertex};

/// One renderable mesh of an assembled model
#[derive(Debug, Clone)]
pub struct ModelMesh {
    /// Vertex array the indices point into
    pub vertices: Vec<GeometryVertex>,
    /// Triangle indices, groups of three
    pub indices: Vec<u32>,
    /// Material name, resolved through the texture table or the inline
    /// string region. Textures are conventionally looked up as
    /// `material + ".dds"`.
    pub material: String,
}

impl ModelMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// A fully assembled model
#[derive(Debug, Clone)]
pub struct Model {
    /// Model name from the header, possibly empty
    pub name: String,
    /// Model bounding box
    pub bounds: BoundingBox,
    /// Sphere colliders
    pub colliders: Vec<Collider>,
    /// Bone rest positions
    pub bones: Vec<Bone>,
    /// Renderable meshes; empty when no geometry stream was supplied for
    /// a model that stores geometry externally
    pub meshes: Vec<ModelMesh>,
    /// What the decoders did and discarded
    pub report: DecodeReport,
}

impl Model {
    /// Parse a model from its header buffer and, for the current
    /// generation, the accompanying geometry stream.
    ///
    /// Legacy models ignore `stream` when their header carries inline
    /// geometry. A header that only parses through the legacy-compatible
    /// fallback has its stream decoded by the pattern scanner.
    pub fn parse(
        model_bytes: &[u8],
        stream: Option<&[u8]>,
        options: &DecodeOptions,
    ) -> Result<Model> {
        let parsed = header::parse_model_header(model_bytes)?;
        let colliders = header::parse_colliders(model_bytes);
        let bones = header::parse_bones(model_bytes);

        let name = parsed.name().to_owned();
        let bounds = parsed.bounds();

        let (meshes, report) = match &parsed {
            ModelHeader::InlineGeometry(inline) => {
                if has_inline_geometry(inline) {
                    (assemble_inline(inline), DecodeReport::default())
                } else if let Some(stream) = stream {
                    let (decoded, report) =
                        geometry::decode_geometry_unstructured(stream, options)?;
                    assemble_decoded(decoded, &[], report)
                } else {
                    (Vec::new(), DecodeReport::default())
                }
            }
            ModelHeader::ExternalGeometry(meta) => match stream {
                Some(stream) => {
                    let (decoded, report) =
                        geometry::decode_geometry(model_bytes, stream, meta, options)?;
                    assemble_decoded(decoded, &meta.texture_names, report)
                }
                None => {
                    log::debug!("no geometry stream supplied, model has no meshes");
                    (Vec::new(), DecodeReport::default())
                }
            },
        };

        Ok(Model {
            name,
            bounds,
            colliders,
            bones,
            meshes,
            report,
        })
    }
}

fn has_inline_geometry(inline: &InlineModel) -> bool {
    inline
        .subobjects
        .iter()
        .flat_map(|s| &s.meshes)
        .any(|m| m.segments.iter().any(|seg| !seg.vertices.is_empty()))
}

/// Each inline segment is one triangle strip; a subobject mesh becomes one
/// renderable mesh with its segments triangulated independently.
fn assemble_inline(inline: &InlineModel) -> Vec<ModelMesh> {
    let mut meshes = Vec::new();
    for subobject in &inline.subobjects {
        for mesh in &subobject.meshes {
            let mut vertices = Vec::new();
            let mut indices = Vec::new();
            for segment in &mesh.segments {
                #[allow(clippy::cast_possible_truncation)]
                let offset = vertices.len() as u32;
                let list = strip::assemble_strips(&segment.vertices, None);
                indices.extend(list.indices.iter().map(|i| i + offset));
                vertices.extend_from_slice(&segment.vertices);
            }
            if indices.is_empty() {
                continue;
            }
            let material = if mesh.material.is_empty() {
                subobject.material.clone()
            } else {
                mesh.material.clone()
            };
            meshes.push(ModelMesh {
                vertices,
                indices,
                material,
            });
        }
    }
    meshes
}

fn assemble_decoded(
    decoded: Vec<crate::types::DecodedMesh>,
    texture_names: &[String],
    mut report: DecodeReport,
) -> (Vec<ModelMesh>, DecodeReport) {
    let mut meshes = Vec::new();
    for mesh in decoded {
        let list = strip::assemble_strips(&mesh.vertices, mesh.strip_vertex_counts.as_deref());
        report.degenerates_skipped += list.degenerates_skipped;
        report.strip_breaks += list.strip_breaks;
        if list.indices.is_empty() {
            continue;
        }
        let material = texture_names
            .get(usize::from(mesh.texture_index))
            .cloned()
            .unwrap_or_default();
        meshes.push(ModelMesh {
            vertices: mesh.vertices,
            indices: list.indices,
            material,
        });
    }
    (meshes, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{InlineMesh, Segment, Subobject};

    fn vertex(x: f32, y: f32, z: f32) -> GeometryVertex {
        GeometryVertex {
            position: [x, y, z],
            ..GeometryVertex::default()
        }
    }

    #[test]
    fn test_inline_assembly_offsets_segment_indices() {
        let inline = InlineModel {
            subobjects: vec![Subobject {
                material: "so_mat".into(),
                meshes: vec![InlineMesh {
                    material: "mesh_mat".into(),
                    segments: vec![
                        Segment {
                            vertices: vec![
                                vertex(0.0, 0.0, 0.0),
                                vertex(1.0, 0.0, 0.0),
                                vertex(0.0, 1.0, 0.0),
                            ],
                        },
                        Segment {
                            vertices: vec![
                                vertex(5.0, 0.0, 0.0),
                                vertex(6.0, 0.0, 0.0),
                                vertex(5.0, 1.0, 0.0),
                            ],
                        },
                    ],
                }],
                ..Subobject::default()
            }],
            ..InlineModel::default()
        };

        let meshes = assemble_inline(&inline);
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].material, "mesh_mat");
        assert_eq!(meshes[0].vertices.len(), 6);
        assert_eq!(meshes[0].indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_external_header_without_stream_keeps_metadata() {
        // Header-only parse: component/texture tables but no geometry.
        let mut bytes = vec![0u8; 0x200];
        bytes[0x4..0x6].copy_from_slice(&1u16.to_le_bytes());
        bytes[0x6..0x8].copy_from_slice(&1u16.to_le_bytes());
        bytes[0x50..0x52].copy_from_slice(&0x100u16.to_le_bytes());
        bytes[0x54..0x58].copy_from_slice(&0x150u32.to_le_bytes());
        bytes[0x150..0x154].copy_from_slice(&0x158u32.to_le_bytes());
        bytes[0x158..0x15C].copy_from_slice(b"tex\0");

        let model = Model::parse(&bytes, None, &DecodeOptions::default()).unwrap();
        assert!(model.meshes.is_empty());
        assert!(model.colliders.is_empty());
    }
}
