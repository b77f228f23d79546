//! Model header parsing
//!
//! Two header generations exist. The legacy generation (`MDL2` magic) embeds
//! its geometry inline as subobjects of meshes of segments; the current
//! generation carries no geometry at all, only the metadata needed to decode
//! a separate geometry stream. Neither layout was ever documented, so
//! [`parse_model_header`] is a state machine over parse strategies: each
//! strategy is tried in order, a failure in one is contained and the next is
//! attempted, and only when all fail does the parse error out.

use crate::blob::{Blob, snorm_byte, unorm_byte};
use crate::error::{MdlError, Result};
use crate::types::{Bone, BoundingBox, Collider, GeometryVertex};
use glam::Vec3;

/// Legacy model header magic (`"MDL2"`)
pub const MDL2_MAGIC: u32 = 0x324C_444D;

/// Upper bound applied to every header count before allocation.
///
/// Real models stay far below this; anything above it is treated as garbage
/// rather than a reason to allocate.
pub const COUNT_SANITY_LIMIT: u16 = 1000;

/// Stride of a legacy subobject record
const SUBOBJECT_STRIDE: usize = 80;

/// Stride of a legacy mesh record
const MESH_STRIDE: usize = 16;

/// Stride of a current-generation component description
const COMPONENT_STRIDE: usize = 0x40;

/// Stride of one anim-node list slot
const ANIM_NODE_LIST_STRIDE: usize = 0x80;

/// Parsed model header, tagged by generation
#[derive(Debug, Clone)]
pub enum ModelHeader {
    /// Legacy header with geometry embedded inline
    InlineGeometry(InlineModel),
    /// Current-generation header describing an external geometry stream
    ExternalGeometry(ExternalMetadata),
}

impl ModelHeader {
    /// Model bounding box, whichever generation
    pub fn bounds(&self) -> BoundingBox {
        match self {
            ModelHeader::InlineGeometry(m) => m.bounds,
            ModelHeader::ExternalGeometry(m) => m.bounds,
        }
    }

    /// Model name, whichever generation
    pub fn name(&self) -> &str {
        match self {
            ModelHeader::InlineGeometry(m) => &m.name,
            ModelHeader::ExternalGeometry(m) => &m.name,
        }
    }
}

/// Legacy model: bounds, name and inline subobject tree
#[derive(Debug, Clone, Default)]
pub struct InlineModel {
    /// Model bounding box
    pub bounds: BoundingBox,
    /// Model name from the string region
    pub name: String,
    /// Subobjects with embedded geometry (may be empty when the header was
    /// accepted by the legacy-compatible fallback and geometry lives in an
    /// external stream instead)
    pub subobjects: Vec<Subobject>,
}

/// One legacy subobject
#[derive(Debug, Clone, Default)]
pub struct Subobject {
    /// Subobject bounding box
    pub bounds: BoundingBox,
    /// Subobject name
    pub name: String,
    /// Material name
    pub material: String,
    /// Declared triangle count
    pub triangle_count: u32,
    /// Meshes of this subobject
    pub meshes: Vec<InlineMesh>,
}

/// One legacy mesh: a material plus its vertex segments
#[derive(Debug, Clone, Default)]
pub struct InlineMesh {
    /// Material name
    pub material: String,
    /// Vertex segments; each segment is one triangle strip
    pub segments: Vec<Segment>,
}

/// One legacy vertex segment
#[derive(Debug, Clone, Default)]
pub struct Segment {
    /// Decoded vertices
    pub vertices: Vec<GeometryVertex>,
}

/// Current-generation metadata: everything needed to decode the external
/// geometry stream, but no geometry itself
#[derive(Debug, Clone, Default)]
pub struct ExternalMetadata {
    /// Number of components (subobject equivalents)
    pub component_count: u16,
    /// Number of textures in the name table
    pub texture_count: u16,
    /// Number of anim nodes
    pub anim_node_count: u16,
    /// Number of reference points
    pub ref_point_count: u16,
    /// Declared mesh count (informational)
    pub mesh_count: u16,
    /// Declared strip count (informational)
    pub strip_count: u16,
    /// Model bounding box
    pub bounds: BoundingBox,
    /// Model name (empty when the header stores none)
    pub name: String,
    /// Offset of the component description table
    pub component_descriptions_offset: u16,
    /// Offset of the texture name-offset table
    pub texture_list_offset: u32,
    /// Offset of the ref-point offset table
    pub ref_point_offsets_offset: u32,
    /// Offset of the anim-node data block
    pub anim_node_data_offset: u16,
    /// Offset of the anim-node list table (zero when absent)
    pub anim_node_lists_offset: u32,
    /// Offset of the texture x component object lookup table
    pub object_lookup_offset: u32,
    /// Offset of the string table, read out of the first component
    pub string_table_offset: u16,
    /// Texture names, indexed by the lookup table's texture axis
    pub texture_names: Vec<String>,
    /// Per-component bounds and names
    pub components: Vec<ComponentDescription>,
}

/// Bounds and name of one current-generation component
#[derive(Debug, Clone, Default)]
pub struct ComponentDescription {
    /// Component bounding box
    pub bounds: BoundingBox,
    /// Component name (empty when the header stores none)
    pub name: String,
}

impl ExternalMetadata {
    /// Read the anim-node lists used to remap per-strip bone indices into
    /// the model's global bone space. Returns an empty table when the header
    /// stores none; individual out-of-range lists come back empty.
    pub fn anim_node_lists(&self, model_bytes: &[u8]) -> Vec<Vec<u8>> {
        if self.anim_node_lists_offset == 0 {
            return Vec::new();
        }
        let blob = Blob::new(model_bytes);
        let Ok(list_count) = blob.u16_at(0x10) else {
            return Vec::new();
        };

        let mut lists = Vec::with_capacity(usize::from(list_count.min(COUNT_SANITY_LIMIT)));
        for i in 0..usize::from(list_count.min(COUNT_SANITY_LIMIT)) {
            let list_offset = self.anim_node_lists_offset as usize + i * ANIM_NODE_LIST_STRIDE;
            let mut list = Vec::new();
            if let Ok(count) = blob.u8_at(list_offset) {
                for x in 0..usize::from(count).min(ANIM_NODE_LIST_STRIDE - 1) {
                    match blob.u8_at(list_offset + 1 + x) {
                        Ok(b) => list.push(b),
                        Err(_) => break,
                    }
                }
            }
            lists.push(list);
        }
        lists
    }
}

/// Parse a model header blob, trying each strategy in order:
///
/// 1. legacy `MDL2` signature with inline subobject parsing;
/// 2. current-generation structured parse (external geometry metadata);
/// 3. legacy field layout without the signature, tolerating implausible
///    subobject offsets by skipping subobject parsing entirely.
///
/// A failure in one stage never aborts the whole parse; only when every
/// stage rejects the buffer does this return [`MdlError::MalformedHeader`].
pub fn parse_model_header(bytes: &[u8]) -> Result<ModelHeader> {
    let blob = Blob::new(bytes);

    if blob.u32_at(0).is_ok_and(|magic| magic == MDL2_MAGIC) {
        match parse_inline(blob) {
            Ok(model) => return Ok(ModelHeader::InlineGeometry(model)),
            Err(e) => log::debug!("legacy signature parse rejected: {e}"),
        }
    }

    match parse_external(blob) {
        Ok(meta) => return Ok(ModelHeader::ExternalGeometry(meta)),
        Err(e) => log::debug!("current-generation parse rejected: {e}"),
    }

    match parse_legacy_compatible(blob) {
        Ok(model) => Ok(ModelHeader::InlineGeometry(model)),
        Err(e) => {
            log::debug!("legacy-compatible fallback rejected: {e}");
            Err(MdlError::malformed(
                "header rejected by every parse strategy",
            ))
        }
    }
}

/// Colliders stored at fixed header offsets (both generations share this
/// block). Records whose range exceeds the buffer are skipped.
pub fn parse_colliders(bytes: &[u8]) -> Vec<Collider> {
    let blob = Blob::new(bytes);
    let (Ok(count), Ok(offset)) = (blob.u16_at(8), blob.u32_at(16)) else {
        return Vec::new();
    };

    let mut colliders = Vec::new();
    for i in 0..usize::from(count) {
        let off = offset as usize + i * 32;
        if blob.bytes_at(off, 32).is_err() {
            continue;
        }
        let parsed = (|| -> Result<Collider> {
            Ok(Collider {
                position: read_vec3(&blob, off)?,
                radius: blob.f32_at(off + 12)?,
            })
        })();
        if let Ok(c) = parsed {
            colliders.push(c);
        }
    }
    colliders
}

/// Bone rest positions stored at fixed header offsets (both generations)
pub fn parse_bones(bytes: &[u8]) -> Vec<Bone> {
    let blob = Blob::new(bytes);
    let (Ok(count), Ok(offset)) = (blob.u16_at(10), blob.u32_at(20)) else {
        return Vec::new();
    };

    let mut bones = Vec::new();
    for i in 0..usize::from(count) {
        let off = offset as usize + i * 16;
        if blob.bytes_at(off, 16).is_err() {
            continue;
        }
        if let Ok(position) = read_vec3(&blob, off) {
            bones.push(Bone { position });
        }
    }
    bones
}

fn read_vec3(blob: &Blob<'_>, offset: usize) -> Result<Vec3> {
    Ok(Vec3::new(
        blob.f32_at(offset)?,
        blob.f32_at(offset + 4)?,
        blob.f32_at(offset + 8)?,
    ))
}

/// Bounds rows as the legacy header stores them: three vec3 rows with a
/// 4-byte gap after each
fn read_legacy_bounds(blob: &Blob<'_>, offset: usize) -> Result<BoundingBox> {
    Ok(BoundingBox {
        corner: read_vec3(blob, offset)?,
        size: read_vec3(blob, offset + 16)?,
        origin: read_vec3(blob, offset + 32)?,
    })
}

// ---------------------------------------------------------------------------
// Strategy 1: legacy MDL2
// ---------------------------------------------------------------------------

fn parse_inline(blob: Blob<'_>) -> Result<InlineModel> {
    let subobject_count = blob.u16_at(6)?;
    let subobject_offset = blob.u32_at(12)? as usize;

    let bounds = read_legacy_bounds(&blob, 32)?;
    // The name offset overlaps the third bounds row in this layout; both
    // reads are intentional.
    let name = blob.cstr_at(blob.u32_at(68)? as usize)?;

    if subobject_count > COUNT_SANITY_LIMIT {
        return Err(MdlError::malformed(format!(
            "subobject count {subobject_count} exceeds {COUNT_SANITY_LIMIT}"
        )));
    }

    let mut subobjects = Vec::with_capacity(usize::from(subobject_count));
    for i in 0..usize::from(subobject_count) {
        subobjects.push(parse_subobject(
            &blob,
            subobject_offset + i * SUBOBJECT_STRIDE,
        )?);
    }

    Ok(InlineModel {
        bounds,
        name,
        subobjects,
    })
}

fn parse_subobject(blob: &Blob<'_>, offset: usize) -> Result<Subobject> {
    let bounds = read_legacy_bounds(blob, offset)?;
    let name = blob.cstr_at(blob.u32_at(offset + 48)? as usize)?;
    let material = blob.cstr_at(blob.u32_at(offset + 52)? as usize)?;
    let triangle_count = blob.u32_at(offset + 56)?;
    let mesh_count = blob.u16_at(offset + 66)?;
    let mesh_offset = blob.u32_at(offset + 68)? as usize;

    if mesh_count > COUNT_SANITY_LIMIT {
        return Err(MdlError::malformed(format!(
            "mesh count {mesh_count} exceeds {COUNT_SANITY_LIMIT}"
        )));
    }

    let mut meshes = Vec::with_capacity(usize::from(mesh_count));
    for i in 0..usize::from(mesh_count) {
        meshes.push(parse_inline_mesh(blob, mesh_offset + i * MESH_STRIDE)?);
    }

    Ok(Subobject {
        bounds,
        name,
        material,
        triangle_count,
        meshes,
    })
}

fn parse_inline_mesh(blob: &Blob<'_>, offset: usize) -> Result<InlineMesh> {
    let material = blob.cstr_at(blob.u32_at(offset)? as usize)?;
    let mut segment_offset = blob.u32_at(offset + 4)? as usize;
    let segment_count = blob.u32_at(offset + 12)?;

    if segment_count > u32::from(COUNT_SANITY_LIMIT) {
        return Err(MdlError::malformed(format!(
            "segment count {segment_count} exceeds {COUNT_SANITY_LIMIT}"
        )));
    }

    let mut segments = Vec::with_capacity(segment_count as usize);
    for _ in 0..segment_count {
        let (segment, size) = parse_segment(blob, segment_offset)?;
        segments.push(segment);
        segment_offset += size;
    }

    Ok(InlineMesh { material, segments })
}

/// Parse one self-sizing legacy vertex segment. Returns the segment and the
/// number of bytes it occupies so the caller can advance to the next one.
///
/// Layout after the 52-byte segment header: packed position, normal,
/// texcoord+skin and colour arrays, each preceded by 4 bytes of padding
/// (except positions).
fn parse_segment(blob: &Blob<'_>, offset: usize) -> Result<(Segment, usize)> {
    let vertex_count = blob.u32_at(offset + 12)? as usize;
    if vertex_count > 100_000 {
        return Err(MdlError::malformed(format!(
            "segment vertex count {vertex_count} implausible"
        )));
    }

    let size = 52 + vertex_count * 12 + 4 + vertex_count * 4 + 4 + vertex_count * 8 + 4
        + vertex_count * 4;
    // One up-front range check instead of per-field checks.
    blob.bytes_at(offset, size)?;

    let positions = offset + 52;
    let normals = positions + vertex_count * 12 + 4;
    let texcoords = normals + vertex_count * 4 + 4;
    let colours = texcoords + vertex_count * 8 + 4;

    let mut vertices = Vec::with_capacity(vertex_count);
    for i in 0..vertex_count {
        let p = positions + i * 12;
        let n = normals + i * 4;
        let t = texcoords + i * 8;
        let c = colours + i * 4;

        vertices.push(GeometryVertex {
            position: [blob.f32_at(p)?, blob.f32_at(p + 4)?, blob.f32_at(p + 8)?],
            normal: [
                snorm_byte(blob.u8_at(n)?),
                snorm_byte(blob.u8_at(n + 1)?),
                snorm_byte(blob.u8_at(n + 2)?),
            ],
            texcoord: [
                f32::from(blob.i16_at(t)?) / 4096.0,
                (f32::from(blob.i16_at(t + 2)?) / 4096.0 - 1.0).abs(),
            ],
            skin: [
                f32::from(blob.i16_at(t + 4)?) / 4096.0,
                f32::from(blob.i8_at(t + 6)?),
                f32::from(blob.i8_at(t + 7)?),
            ],
            colour: [
                unorm_byte(blob.u8_at(c)?),
                unorm_byte(blob.u8_at(c + 1)?),
                unorm_byte(blob.u8_at(c + 2)?),
                unorm_byte(blob.u8_at(c + 3)?),
            ],
        });
    }

    Ok((Segment { vertices }, size))
}

// ---------------------------------------------------------------------------
// Strategy 2: current generation
// ---------------------------------------------------------------------------

fn parse_external(blob: Blob<'_>) -> Result<ExternalMetadata> {
    let component_count = blob.u16_at(0x4)?;
    let texture_count = blob.u16_at(0x6)?;
    let anim_node_count = blob.u16_at(0x8)?;
    let ref_point_count = blob.u16_at(0xA)?;
    let mesh_count = blob.u16_at(0xE)?;
    let strip_count = blob.u16_at(0x1E)?;

    for (what, count) in [
        ("component", component_count),
        ("texture", texture_count),
        ("anim node", anim_node_count),
        ("ref point", ref_point_count),
    ] {
        if count > COUNT_SANITY_LIMIT {
            return Err(MdlError::malformed(format!(
                "{what} count {count} exceeds {COUNT_SANITY_LIMIT}"
            )));
        }
    }

    let bounds = BoundingBox {
        corner: read_vec3(&blob, 0x30)?,
        size: read_vec3(&blob, 0x40)?,
        origin: Vec3::ZERO,
    };

    let component_descriptions_offset = blob.u16_at(0x50)?;
    let texture_list_offset = blob.u32_at(0x54)?;
    let ref_point_offsets_offset = blob.u32_at(0x58)?;
    let anim_node_data_offset = blob.u16_at(0x5C)?;
    let anim_node_lists_offset = blob.u32_at(0x64)?;
    let object_lookup_offset = blob.u32_at(0x68)?;

    let mut texture_names = Vec::with_capacity(usize::from(texture_count));
    for ti in 0..usize::from(texture_count) {
        let name_offset = blob.u32_at(texture_list_offset as usize + ti * 4)?;
        texture_names.push(blob.cstr_at(name_offset as usize)?);
    }

    let string_table_offset = if component_descriptions_offset > 0 {
        blob.u16_at(usize::from(component_descriptions_offset) + 0x34)?
    } else {
        0
    };

    // Component descriptions are best-effort: an out-of-range one becomes a
    // default entry rather than rejecting the whole header.
    let mut components = Vec::with_capacity(usize::from(component_count));
    for i in 0..usize::from(component_count) {
        let off = usize::from(component_descriptions_offset) + i * COMPONENT_STRIDE;
        let parsed = (|| -> Result<ComponentDescription> {
            let bounds = BoundingBox {
                corner: read_vec3(&blob, off)?,
                size: read_vec3(&blob, off + 16)?,
                origin: read_vec3(&blob, off + 32)?,
            };
            let name_offset = blob.u32_at(off + 0x30)? as usize;
            let name = if name_offset > 0 {
                blob.cstr_at(name_offset)?
            } else {
                String::new()
            };
            Ok(ComponentDescription { bounds, name })
        })();
        components.push(parsed.unwrap_or_else(|e| {
            log::debug!("component description {i} unreadable: {e}");
            ComponentDescription::default()
        }));
    }

    let name = components
        .first()
        .map(|c| c.name.clone())
        .unwrap_or_default();

    Ok(ExternalMetadata {
        component_count,
        texture_count,
        anim_node_count,
        ref_point_count,
        mesh_count,
        strip_count,
        bounds,
        name,
        component_descriptions_offset,
        texture_list_offset,
        ref_point_offsets_offset,
        anim_node_data_offset,
        anim_node_lists_offset,
        object_lookup_offset,
        string_table_offset,
        texture_names,
        components,
    })
}

// ---------------------------------------------------------------------------
// Strategy 3: legacy layout without the signature
// ---------------------------------------------------------------------------

fn parse_legacy_compatible(blob: Blob<'_>) -> Result<InlineModel> {
    let subobject_count = blob.u16_at(6)?;
    let collider_count = blob.u16_at(8)?;
    let bone_count = blob.u16_at(10)?;

    for (what, count) in [
        ("subobject", subobject_count),
        ("collider", collider_count),
        ("bone", bone_count),
    ] {
        if count > COUNT_SANITY_LIMIT {
            return Err(MdlError::malformed(format!(
                "{what} count {count} exceeds {COUNT_SANITY_LIMIT}"
            )));
        }
    }

    let subobject_offset = blob.u32_at(12)? as usize;

    // Offsets that are implausibly large, or zero with a nonzero count, mean
    // the structure differs from the legacy layout after all; geometry then
    // comes from the external stream, so subobject parsing is skipped.
    let skip_subobjects =
        subobject_offset > 10_000 || (subobject_offset == 0 && subobject_count > 0);

    let bounds = read_legacy_bounds(&blob, 32)?;
    let name_offset = blob.u32_at(68)? as usize;
    let name = if name_offset > 0 && name_offset < 1_000_000 {
        blob.cstr_at(name_offset).unwrap_or_default()
    } else {
        String::new()
    };

    let mut subobjects = Vec::with_capacity(usize::from(subobject_count));
    if skip_subobjects {
        log::debug!(
            "subobject offset {subobject_offset} looks invalid, relying on external stream"
        );
        subobjects.resize_with(usize::from(subobject_count), Subobject::default);
    } else {
        for i in 0..usize::from(subobject_count) {
            let off = subobject_offset + i * SUBOBJECT_STRIDE;
            subobjects.push(parse_subobject(&blob, off).unwrap_or_else(|e| {
                log::debug!("subobject {i} unreadable, keeping empty: {e}");
                Subobject::default()
            }));
        }
    }

    Ok(InlineModel {
        bounds,
        name,
        subobjects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal current-generation header accepted by the structured parse
    fn external_fixture() -> Vec<u8> {
        let mut bytes = vec![0u8; 0x200];
        bytes[0x4..0x6].copy_from_slice(&1u16.to_le_bytes()); // components
        bytes[0x6..0x8].copy_from_slice(&1u16.to_le_bytes()); // textures
        bytes[0x30..0x34].copy_from_slice(&1.0f32.to_le_bytes());
        bytes[0x40..0x44].copy_from_slice(&2.0f32.to_le_bytes());
        bytes[0x50..0x52].copy_from_slice(&0x100u16.to_le_bytes()); // component descriptions
        bytes[0x54..0x58].copy_from_slice(&0x150u32.to_le_bytes()); // texture list
        bytes[0x68..0x6C].copy_from_slice(&0x160u32.to_le_bytes()); // object lookup
        // texture list: one entry pointing at the name string
        bytes[0x150..0x154].copy_from_slice(&0x158u32.to_le_bytes());
        bytes[0x158..0x15E].copy_from_slice(b"tex_A\0");
        bytes
    }

    #[test]
    fn test_external_header_parses() {
        let bytes = external_fixture();
        let header = parse_model_header(&bytes).unwrap();
        let ModelHeader::ExternalGeometry(meta) = header else {
            panic!("expected external geometry header");
        };
        assert_eq!(meta.component_count, 1);
        assert_eq!(meta.texture_names, vec!["tex_A".to_string()]);
        assert_eq!(meta.object_lookup_offset, 0x160);
        assert!((meta.bounds.corner.x - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_oversized_count_is_malformed_without_allocation() {
        let mut bytes = vec![0u8; 0x80];
        // Both the current-generation component count and the legacy-layout
        // subobject count are garbage, so every strategy must reject.
        bytes[0x4..0x6].copy_from_slice(&50_000u16.to_le_bytes());
        bytes[0x6..0x8].copy_from_slice(&50_000u16.to_le_bytes());
        assert!(matches!(
            parse_model_header(&bytes),
            Err(MdlError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_empty_buffer_is_malformed() {
        assert!(matches!(
            parse_model_header(&[]),
            Err(MdlError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_legacy_compatible_skips_implausible_subobject_offset() {
        let mut bytes = vec![0u8; 0x100];
        bytes[6..8].copy_from_slice(&2u16.to_le_bytes()); // subobjects
        bytes[12..16].copy_from_slice(&500_000u32.to_le_bytes()); // way out
        let header = parse_model_header(&bytes).unwrap();
        let ModelHeader::InlineGeometry(model) = header else {
            panic!("expected inline fallback");
        };
        assert_eq!(model.subobjects.len(), 2);
        assert!(model.subobjects.iter().all(|s| s.meshes.is_empty()));
    }

    #[test]
    fn test_colliders_and_bones_skip_out_of_range_records() {
        let mut bytes = vec![0u8; 0x100];
        bytes[8..10].copy_from_slice(&2u16.to_le_bytes()); // collider count
        bytes[16..20].copy_from_slice(&0xF0u32.to_le_bytes()); // only 16 bytes left
        bytes[10..12].copy_from_slice(&1u16.to_le_bytes()); // bone count
        bytes[20..24].copy_from_slice(&0x40u32.to_le_bytes());
        bytes[0x40..0x44].copy_from_slice(&3.5f32.to_le_bytes());

        assert!(parse_colliders(&bytes).is_empty());
        let bones = parse_bones(&bytes);
        assert_eq!(bones.len(), 1);
        assert!((bones[0].position.x - 3.5).abs() < f32::EPSILON);
    }
}
