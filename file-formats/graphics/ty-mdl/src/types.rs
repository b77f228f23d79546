//! Shared geometry data types

use glam::Vec3;

/// One decoded vertex.
///
/// The `skin` triple and (for the PC encoding) the colour are only partly
/// understood; raw values are preserved as decoded so nothing is lost for
/// later format archaeology.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryVertex {
    /// Position (x, y, z)
    pub position: [f32; 3],
    /// Normal (x, y, z), unit-ish, or a default when the sub-layout lacks one
    pub normal: [f32; 3],
    /// Texture coordinates (u, v) with V already flipped to GL convention
    pub texcoord: [f32; 2],
    /// Weight/modifier and two bone slots; semantics partly unknown
    pub skin: [f32; 3],
    /// RGBA colour; defaults to white where the stream stores none
    pub colour: [f32; 4],
}

impl Default for GeometryVertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            texcoord: [0.0; 2],
            skin: [0.0; 3],
            colour: [1.0; 4],
        }
    }
}

/// One decoded mesh: an ordered vertex run plus the metadata needed to
/// texture it and (optionally) to split it back into strips.
#[derive(Debug, Clone, Default)]
pub struct DecodedMesh {
    /// Decoded vertices in stream order
    pub vertices: Vec<GeometryVertex>,
    /// Per-strip vertex counts from the mesh header. Unreliable; strip
    /// assembly reconciles them against the vertex total and falls back to
    /// deriving boundaries when they disagree.
    pub strip_vertex_counts: Option<Vec<u16>>,
    /// Index into the model's texture-name table
    pub texture_index: u16,
    /// Index of the component this mesh belongs to
    pub component_index: u16,
    /// Per-mesh constant float pair from the PC vertex stride; purpose
    /// unknown, preserved raw
    pub mesh_constants: Option<[f32; 2]>,
}

/// A flat triangle index buffer with assembly diagnostics
#[derive(Debug, Clone, Default)]
pub struct TriangleList {
    /// Vertex indices, groups of 3, winding consistent with strip alternation
    pub indices: Vec<u32>,
    /// Connector (degenerate) triangles filtered during assembly
    pub degenerates_skipped: usize,
    /// Strips abandoned because their declared range fell outside the
    /// vertex array
    pub strip_breaks: usize,
}

impl TriangleList {
    /// Number of triangles emitted
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Triangles considered before degenerate filtering
    pub fn triangles_considered(&self) -> usize {
        self.triangle_count() + self.degenerates_skipped
    }
}

/// Axis-aligned model bounds as stored in the headers.
///
/// The third row is carried raw: in legacy headers it overlaps the name
/// offset field and its meaning is unconfirmed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    /// Box corner (minimum)
    pub corner: Vec3,
    /// Box size along each axis
    pub size: Vec3,
    /// Third stored row, origin or unknown
    pub origin: Vec3,
}

/// A sphere collider from the model header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collider {
    /// Sphere centre
    pub position: Vec3,
    /// Sphere radius
    pub radius: f32,
}

/// A bone rest position from the model header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bone {
    /// Rest position
    pub position: Vec3,
}
