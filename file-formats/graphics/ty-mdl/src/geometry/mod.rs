//! Geometry stream decoding
//!
//! Geometry streams come in two incompatible encodings that share a file
//! extension. The console encoding wraps each strip in DMA packets tagged
//! with a fixed 4-byte marker; the desktop encoding stores one contiguous
//! block of 48-byte vertices located heuristically after the mesh headers.
//! Encoding selection is always by content sniffing, never by extension.

mod console;
mod fallback;
mod pc;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{MdlError, Result};
use crate::header::ExternalMetadata;
use crate::types::DecodedMesh;

pub use pc::{VERTEX_STRIDE, locate_vertex_block};

/// DMA packet marker opening every console strip
pub const CONSOLE_MARKER: [u8; 4] = [0x00, 0x80, 0x02, 0x6C];

/// How many leading bytes are sniffed for [`CONSOLE_MARKER`]
const DETECT_WINDOW: usize = 1000;

/// Detected geometry stream encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEncoding {
    /// Console DMA packet layout, fixed-point texcoords
    Console,
    /// Desktop contiguous 48-byte vertex block, float attributes
    Pc,
}

impl std::fmt::Display for StreamEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamEncoding::Console => write!(f, "console"),
            StreamEncoding::Pc => write!(f, "pc"),
        }
    }
}

/// Whether desktop texcoords are shifted forward by one vertex
///
/// Some desktop streams store each vertex's texcoord in the following
/// vertex slot. `Auto` decides per mesh by majority vote over the stitch
/// duplicates, which carry identical positions and so should carry
/// identical texcoords under the correct alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UvShiftMode {
    /// Decide per mesh from the stitch duplicates
    #[default]
    Auto,
    /// Never shift
    Never,
    /// Always shift
    Always,
}

/// Decode options shared by all decoder passes
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Desktop texcoord alignment policy
    pub uv_shift: UvShiftMode,
    /// Advisory cancellation flag. Checked between meshes; when raised the
    /// decode returns [`MdlError::Cancelled`].
    pub cancel: Option<Arc<AtomicBool>>,
}

impl DecodeOptions {
    pub(crate) fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(MdlError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// What the decoder did and discarded, for diagnostics
#[derive(Debug, Clone, Default)]
pub struct DecodeReport {
    /// Encoding the stream was decoded as
    pub encoding: Option<StreamEncoding>,
    /// Whether the pattern-scanning fallback produced the output
    pub fallback_used: bool,
    /// Meshes decoded successfully
    pub meshes_decoded: usize,
    /// Strips or meshes abandoned mid-decode by a failed bounds check
    pub strips_abandoned: usize,
    /// Meshes rejected by the box-like filter
    pub box_like_rejected: usize,
    /// Connector triangles filtered during strip assembly
    pub degenerates_skipped: usize,
    /// Strips abandoned during assembly because their declared range fell
    /// outside the vertex array
    pub strip_breaks: usize,
}

/// Sniff the stream encoding by searching the leading bytes for the
/// console DMA marker.
pub fn detect_encoding(stream: &[u8]) -> StreamEncoding {
    let window = &stream[..stream.len().min(DETECT_WINDOW + CONSOLE_MARKER.len())];
    if memchr::memmem::find(window, &CONSOLE_MARKER).is_some() {
        StreamEncoding::Console
    } else {
        StreamEncoding::Pc
    }
}

/// Decode a geometry stream using `meta` parsed from the model buffer.
///
/// Console streams decode directly. Desktop streams run the structured
/// decoder first and fall back to the pattern scanner when it fails or
/// produces nothing. Succeeds if at least one mesh was extracted.
pub fn decode_geometry(
    model_bytes: &[u8],
    stream: &[u8],
    meta: &ExternalMetadata,
    options: &DecodeOptions,
) -> Result<(Vec<DecodedMesh>, DecodeReport)> {
    let mut report = DecodeReport::default();
    let encoding = detect_encoding(stream);
    report.encoding = Some(encoding);

    let meshes = match encoding {
        StreamEncoding::Console => {
            console::decode(model_bytes, stream, meta, options, &mut report)?
        }
        StreamEncoding::Pc => {
            match pc::decode(model_bytes, stream, meta, options, &mut report) {
                Ok(meshes) if !meshes.is_empty() => meshes,
                Ok(_) => {
                    log::warn!("structured desktop decode produced nothing, using fallback");
                    report.fallback_used = true;
                    fallback::decode(stream, options, &mut report)?
                }
                Err(MdlError::Cancelled) => return Err(MdlError::Cancelled),
                Err(e) => {
                    log::warn!("structured desktop decode failed ({e}), using fallback");
                    report.fallback_used = true;
                    fallback::decode(stream, options, &mut report)?
                }
            }
        }
    };

    if meshes.is_empty() {
        return Err(MdlError::ambiguous(
            "no decoder pass extracted any geometry",
        ));
    }

    report.meshes_decoded = meshes.len();
    Ok((meshes, report))
}

/// Decode a stream with no usable metadata at all, e.g. when the model
/// header only parsed through the legacy-compatible fallback.
pub fn decode_geometry_unstructured(
    stream: &[u8],
    options: &DecodeOptions,
) -> Result<(Vec<DecodedMesh>, DecodeReport)> {
    let mut report = DecodeReport {
        encoding: Some(detect_encoding(stream)),
        fallback_used: true,
        ..DecodeReport::default()
    };
    let meshes = fallback::decode(stream, options, &mut report)?;
    if meshes.is_empty() {
        return Err(MdlError::ambiguous(
            "pattern scan extracted no geometry",
        ));
    }
    report.meshes_decoded = meshes.len();
    Ok((meshes, report))
}
