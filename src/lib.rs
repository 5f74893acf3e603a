#![forbid(unsafe_code)]
#![forbid(
    clippy::all,
    clippy::restriction,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
)]

//! Convert Infinity Engine tile graphics between their raster formats
//! and their block compressed counterparts.
//!
//! TIS tilesets and MOS images become TBC and MBC files, and back.
//! The JPEG based TIZ and MOZ containers can be decoded.
//! Tiles are converted in parallel on a worker pool.
//!
//! The simplest entry point is [`convert::convert_file`],
//! which detects the input format from its signature.

pub mod io;
pub mod error;
pub mod colors;
pub mod quantize;
pub mod codec;
pub mod pool;
pub mod format;
pub mod convert;


pub mod prelude {
    // main exports
    pub use crate::convert::{convert_file, Conversion, Options};

    // secondary data types
    pub use crate::codec::Encoding;
    pub use crate::error::{Error, Result};
    pub use crate::format::ArchiveKind;

    pub use crate::convert;
    pub use crate::error;
    pub use crate::format;
}
