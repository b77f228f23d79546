//! Parser for Ty the Tasmanian Tiger model headers and geometry streams
//!
//! Model data is split across two files: a header carrying names, bounds,
//! colliders, bones and (for the legacy generation) inline geometry, and a
//! geometry stream in one of two incompatible encodings selected by content
//! sniffing. Everything here works on in-memory buffers, typically read out
//! of an archive with the `ty-rkv` crate.
//!
//! # Usage
//!
//! ```no_run
//! use ty_mdl::{DecodeOptions, Model};
//!
//! # fn main() -> ty_mdl::Result<()> {
//! let header = std::fs::read("model.mdl")?;
//! let stream = std::fs::read("model.mdg")?;
//!
//! let model = Model::parse(&header, Some(&stream), &DecodeOptions::default())?;
//! for mesh in &model.meshes {
//!     println!(
//!         "{}: {} vertices, {} triangles",
//!         mesh.material,
//!         mesh.vertices.len(),
//!         mesh.triangle_count()
//!     );
//! }
//! # Ok(())
//! # }
//! ```

pub mod blob;
pub mod error;
pub mod geometry;
pub mod header;
pub mod model;
pub mod strip;
pub mod types;

pub use error::{MdlError, Result};
pub use geometry::{
    DecodeOptions, DecodeReport, StreamEncoding, UvShiftMode, decode_geometry, detect_encoding,
};
pub use header::{ExternalMetadata, InlineModel, ModelHeader, parse_model_header};
pub use model::{Model, ModelMesh};
pub use strip::assemble_strips;
pub use types::{Bone, BoundingBox, Collider, DecodedMesh, GeometryVertex, TriangleList};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
