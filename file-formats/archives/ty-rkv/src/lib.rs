//! Parser for Krome Studios RKV game archives.
//!
//! RKV containers come in two generations. RKV1 (Ty the Tasmanian Tiger)
//! anchors its record table at the *end* of the file and carries no magic;
//! RKV2 (Ty 2 era) starts with a `RKV2` magic and stores names in a separate
//! blob. Both store named, offset-addressed raw file blobs with no
//! compression. The layouts here were recovered by binary inspection, so the
//! readers validate aggressively instead of trusting declared counts.
//!
//! # Examples
//!
//! ```no_run
//! use ty_rkv::Archive;
//!
//! let archive = Archive::open("Data_PC.rkv")?;
//! for name in archive.files_by_extension("mdl") {
//!     let bytes = archive.read_file(name)?;
//!     println!("{name}: {} bytes", bytes.len());
//! }
//! # Ok::<(), ty_rkv::Error>(())
//! ```

pub mod archive;
pub mod builder;
pub mod error;

pub use archive::{Archive, FileEntry, FormatVersion};
pub use builder::RkvBuilder;
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
