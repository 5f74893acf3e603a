
//! The tile codecs and how they are identified inside archive headers.
//!
//! An archive header stores a single numeric encoding code which selects
//! the codec for all tiles of the file and whether each encoded tile is
//! additionally wrapped in a zlib stream.

pub mod raw;
pub mod bcn;
pub mod jpeg;

use crate::error::{Error, Result};


/// Bit flag in the encoding code which is set when
/// the per-tile zlib wrapping is disabled.
const NOT_DEFLATED_BIT: u32 = 0x100;


/// How the pixels of a tile are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {

    /// The palette and index bytes of the tile, stored verbatim.
    Raw,

    /// BC1 block compression, one bit of alpha. Also known as DXT1.
    Bc1,

    /// BC2 block compression, four explicit bits of alpha. Also known as DXT3.
    Bc2,

    /// BC3 block compression, interpolated alpha. Also known as DXT5.
    Bc3,

    /// JPEG streams as found in TIZ and MOZ files. Decoding only.
    Jpeg,
}

impl Encoding {

    /// The encoding selected by the low byte of an archive encoding code.
    /// Unknown values are rejected before any tile is processed.
    pub fn from_code(code: u32) -> Result<Self> {
        match code & 0xff {
            0 => Ok(Encoding::Raw),
            1 => Ok(Encoding::Bc1),
            2 => Ok(Encoding::Bc2),
            3 => Ok(Encoding::Bc3),
            4 => Ok(Encoding::Jpeg),
            _ => Err(Error::unsupported("unknown pixel encoding code")),
        }
    }

    /// The low byte of the archive encoding code for this encoding.
    pub fn code_byte(self) -> u32 {
        match self {
            Encoding::Raw => 0,
            Encoding::Bc1 => 1,
            Encoding::Bc2 => 2,
            Encoding::Bc3 => 3,
            Encoding::Jpeg => 4,
        }
    }

    /// A short human readable name, as printed by the command line tool.
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Bc1 => "BC1",
            Encoding::Bc2 => "BC2",
            Encoding::Bc3 => "BC3",
            Encoding::Jpeg => "JPEG",
        }
    }
}

/// Compose the encoding code stored in a TBC or MBC header.
pub fn encoding_code(encoding: Encoding, deflate: bool) -> u32 {
    let deflate = deflate && encoding != Encoding::Jpeg; // jpeg tiles are never wrapped
    encoding.code_byte() | if deflate { 0 } else { NOT_DEFLATED_BIT }
}

/// Whether the encoding code requests the per-tile zlib wrapping.
pub fn is_tile_deflated(code: u32) -> bool {
    (code & NOT_DEFLATED_BIT) == 0
        && !matches!(Encoding::from_code(code), Ok(Encoding::Jpeg))
}


/// Converts between the indexed pixels of a tile and one encoded payload.
///
/// The four byte tile header and the optional zlib wrapping around
/// the payload are handled by the caller.
pub trait TileCodec: Send + Sync {

    /// The exact payload size of an encoded tile with the given dimensions.
    fn encoded_size(&self, width: usize, height: usize) -> usize;

    /// Encode one tile. The index slice contains `width * height` bytes,
    /// the palette contains 256 BGRA entries.
    fn encode(&self, palette: &[u8], indices: &[u8], width: usize, height: usize) -> Result<Vec<u8>>;

    /// Decode one tile payload back to a palette and index bytes.
    fn decode(&self, payload: &[u8], width: usize, height: usize) -> Result<(Vec<u8>, Vec<u8>)>;

    /// Whether this codec can encode at all.
    /// Decode-only codecs reject whole files early instead of per tile.
    fn supports_encode(&self) -> bool { true }
}

/// Instantiate the codec for an encoding, with the two quality settings
/// in their valid range of 0 to 9.
pub fn create_codec(encoding: Encoding, encode_quality: u8, decode_quality: u8) -> Box<dyn TileCodec> {
    match encoding {
        Encoding::Raw => Box::new(raw::RawCodec),
        Encoding::Jpeg => Box::new(jpeg::JpegCodec { decode_quality }),

        Encoding::Bc1 => Box::new(bcn::BcnCodec::new(bcn::BcFormat::Bc1, encode_quality, decode_quality)),
        Encoding::Bc2 => Box::new(bcn::BcnCodec::new(bcn::BcFormat::Bc2, encode_quality, decode_quality)),
        Encoding::Bc3 => Box::new(bcn::BcnCodec::new(bcn::BcFormat::Bc3, encode_quality, decode_quality)),
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encoding_codes_roundtrip(){
        for &encoding in &[ Encoding::Raw, Encoding::Bc1, Encoding::Bc2, Encoding::Bc3 ] {
            for &deflate in &[ true, false ] {
                let code = encoding_code(encoding, deflate);
                assert_eq!(Encoding::from_code(code).unwrap(), encoding);
                assert_eq!(is_tile_deflated(code), deflate);
            }
        }
    }

    #[test]
    fn jpeg_code_is_never_deflated(){
        let code = encoding_code(Encoding::Jpeg, true);
        assert_eq!(Encoding::from_code(code).unwrap(), Encoding::Jpeg);
        assert!(!is_tile_deflated(code));
    }

    #[test]
    fn unknown_code_bytes_are_unsupported(){
        assert!(matches!(Encoding::from_code(7), Err(Error::NotSupported(_))));
        assert!(matches!(Encoding::from_code(0xff), Err(Error::NotSupported(_))));
    }
}
