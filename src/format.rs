
//! The archive headers of the supported file formats and their layout rules.
//!
//! All headers are parsed and written through [`std::io::Read`] and
//! [`std::io::Write`], so they work on files and plain byte slices alike.
//! TIS, MOS, TBC and MBC store their numbers little endian,
//! the TIZ and MOZ containers store theirs big endian.

use std::io::{Read, Write};

use miniz_oxide::deflate::compress_to_vec_zlib;
use zune_inflate::DeflateDecoder;

use crate::colors::PALETTE_SIZE;
use crate::error::{Error, Result, UnitResult};
use crate::io::{read_u16_be, skip_bytes, Data};


/// Width and height of a full size tile, in pixels.
pub const TILE_DIM: usize = 64;

/// Bytes of one raster tile: the palette plus one index byte per pixel.
pub const RAW_TILE_SIZE: usize = PALETTE_SIZE + TILE_DIM * TILE_DIM;

/// Bytes of the width and height header in front of every encoded tile.
pub const TILE_HEADER_SIZE: usize = 4;

/// The tile size announced by TIS files which reference external
/// PVRZ textures instead of containing pixel data.
const PVRZ_TILE_SIZE: u32 = 0x000c;


pub mod signature {
    pub const TIS: &[u8; 4] = b"TIS ";
    pub const MOS: &[u8; 4] = b"MOS ";
    pub const MOSC: &[u8; 4] = b"MOSC";
    pub const TBC: &[u8; 4] = b"TBC ";
    pub const MBC: &[u8; 4] = b"MBC ";
    pub const TIZ: &[u8; 4] = b"TIZ0";
    pub const MOZ: &[u8; 4] = b"MOZ0";

    pub const VERSION_1: &[u8; 4] = b"V1  ";
    pub const VERSION_2: &[u8; 4] = b"V2  ";
    pub const VERSION_1_0: &[u8; 4] = b"V1.0";
}

fn read_4(read: &mut impl Read) -> Result<[u8; 4]> {
    let mut bytes = [0_u8; 4];
    u8::read_slice(read, &mut bytes)?;
    Ok(bytes)
}

fn expect(read: &mut impl Read, expected: &[u8; 4], description: &'static str) -> UnitResult {
    if &read_4(read)? == expected { Ok(()) }
    else { Err(Error::invalid(description)) }
}


/// The number of tile columns or rows covering the given pixel extent.
pub fn tile_grid(pixels: usize) -> usize {
    (pixels + TILE_DIM - 1) / TILE_DIM
}

/// The pixel extent of the tile at the given grid position.
/// Only the last column or row can be smaller than a full tile.
pub fn edge_tile_dim(total_pixels: usize, grid_position: usize) -> usize {
    (total_pixels - grid_position * TILE_DIM).min(TILE_DIM)
}


/// The file format detected from the first four bytes of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind { Tis, Mos, Mosc, Tbc, Mbc, Tiz, Moz }

/// Detect the format from the signature bytes of a file.
pub fn detect_archive(bytes: &[u8]) -> Option<ArchiveKind> {
    match bytes.get(.. 4)? {
        bytes if bytes == signature::TIS => Some(ArchiveKind::Tis),
        bytes if bytes == signature::MOS => Some(ArchiveKind::Mos),
        bytes if bytes == signature::MOSC => Some(ArchiveKind::Mosc),
        bytes if bytes == signature::TBC => Some(ArchiveKind::Tbc),
        bytes if bytes == signature::MBC => Some(ArchiveKind::Mbc),
        bytes if bytes == signature::TIZ => Some(ArchiveKind::Tiz),
        bytes if bytes == signature::MOZ => Some(ArchiveKind::Moz),
        _ => None,
    }
}


/// Header of a palette based TIS tileset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TisHeader {
    pub tile_count: u32,

    /// Some files in the wild declare version 2 even though their
    /// layout is the version 1 layout. They are converted anyway.
    pub version_2: bool,

    /// The file carries no header at all, only raw tiles.
    pub headerless: bool,
}

impl TisHeader {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        expect(read, signature::TIS, "TIS signature")?;

        let version_2 = match &read_4(read)? {
            bytes if bytes == signature::VERSION_1 => false,
            bytes if bytes == signature::VERSION_2 => true,
            _ => return Err(Error::invalid("TIS version")),
        };

        let tile_count = u32::read(read)?;
        if tile_count == 0 {
            return Err(Error::invalid("TIS without tiles"));
        }

        let tile_size = u32::read(read)?;
        if tile_size == PVRZ_TILE_SIZE {
            return Err(Error::unsupported("PVRZ based TIS files"));
        }
        if tile_size as usize != RAW_TILE_SIZE {
            return Err(Error::invalid("TIS tile size"));
        }

        let header_size = u32::read(read)?;
        if header_size < 0x18 {
            return Err(Error::invalid("TIS header size"));
        }

        if u32::read(read)? as usize != TILE_DIM {
            return Err(Error::invalid("TIS tile dimension"));
        }

        skip_bytes(read, header_size as usize - 0x18)?;
        Ok(TisHeader { tile_count, version_2, headerless: false })
    }

    /// Interpret a file without any known signature as raw TIS tiles.
    /// Its size must be an exact multiple of the tile size.
    pub fn headerless(file_size: usize) -> Result<Self> {
        if file_size == 0 || file_size % RAW_TILE_SIZE != 0 {
            return Err(Error::invalid("headerless TIS file size"));
        }

        Ok(TisHeader {
            tile_count: (file_size / RAW_TILE_SIZE) as u32,
            version_2: false,
            headerless: true,
        })
    }

    /// Write a version 1 header for the given number of tiles.
    pub fn write(write: &mut impl Write, tile_count: u32) -> UnitResult {
        u8::write_slice(write, signature::TIS)?;
        u8::write_slice(write, signature::VERSION_1)?;
        tile_count.write(write)?;
        (RAW_TILE_SIZE as u32).write(write)?;
        0x18_u32.write(write)?;
        (TILE_DIM as u32).write(write)?;
        Ok(())
    }
}


/// Header of an uncompressed MOS image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MosHeader {
    pub width: u16,
    pub height: u16,
    pub columns: u16,
    pub rows: u16,
    pub palette_offset: u32,
}

impl MosHeader {

    /// The canonical header for an image of the given pixel size.
    pub fn new(width: u16, height: u16) -> Self {
        MosHeader {
            width, height,
            columns: tile_grid(width as usize) as u16,
            rows: tile_grid(height as usize) as u16,
            palette_offset: 24,
        }
    }

    pub fn read(read: &mut impl Read) -> Result<Self> {
        expect(read, signature::MOS, "MOS signature")?;
        expect(read, signature::VERSION_1, "MOS version")?;

        let width = u16::read(read)?;
        let height = u16::read(read)?;
        if width == 0 || height == 0 {
            return Err(Error::invalid("MOS pixel size"));
        }

        let columns = u16::read(read)?;
        let rows = u16::read(read)?;
        if columns == 0 || rows == 0 {
            return Err(Error::invalid("MOS tile count"));
        }

        if u32::read(read)? as usize != TILE_DIM {
            return Err(Error::invalid("MOS tile dimension"));
        }

        let palette_offset = u32::read(read)?;
        if palette_offset < 24 {
            return Err(Error::invalid("MOS header size"));
        }

        Ok(MosHeader { width, height, columns, rows, palette_offset })
    }

    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, signature::MOS)?;
        u8::write_slice(write, signature::VERSION_1)?;
        self.width.write(write)?;
        self.height.write(write)?;
        self.columns.write(write)?;
        self.rows.write(write)?;
        (TILE_DIM as u32).write(write)?;
        self.palette_offset.write(write)?;
        Ok(())
    }

    pub fn tile_count(&self) -> usize {
        tile_grid(self.width as usize) * tile_grid(self.height as usize)
    }

    /// The byte size of a complete file with this header:
    /// the header, one palette and one offset per tile,
    /// and one index byte per pixel.
    pub fn expected_file_size(&self) -> usize {
        self.palette_offset as usize
            + self.tile_count() * (PALETTE_SIZE + 4)
            + self.width as usize * self.height as usize
    }
}


/// Undo the MOSC wrapping, yielding the plain MOS bytes.
pub fn unwrap_mosc(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut read = bytes;
    expect(&mut read, signature::MOSC, "MOSC signature")?;
    expect(&mut read, signature::VERSION_1, "MOSC version")?;

    let uncompressed_size = u32::read(&mut read)? as usize;
    if uncompressed_size < 24 {
        return Err(Error::invalid("MOSC uncompressed size"));
    }

    let inflated = DeflateDecoder::new(read).decode_zlib()
        .map_err(|error| Error::invalid(format!("MOSC deflate: {:?}", error)))?;

    if inflated.len() != uncompressed_size {
        return Err(Error::invalid("MOSC length mismatch"));
    }

    Ok(inflated)
}

/// Wrap plain MOS bytes in the MOSC compression container.
pub fn wrap_mosc(mos: &[u8]) -> Vec<u8> {
    let mut wrapped = Vec::with_capacity(12 + mos.len() / 2);
    wrapped.extend_from_slice(signature::MOSC);
    wrapped.extend_from_slice(signature::VERSION_1);
    wrapped.extend_from_slice(&(mos.len() as u32).to_le_bytes());
    wrapped.extend_from_slice(&compress_to_vec_zlib(mos, 4));
    wrapped
}


/// Header of a block compressed TBC tileset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TbcHeader {
    pub encoding_code: u32,
    pub tile_count: u32,
}

impl TbcHeader {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        expect(read, signature::TBC, "TBC signature")?;
        expect(read, signature::VERSION_1_0, "TBC version")?;

        let encoding_code = u32::read(read)?;
        let tile_count = u32::read(read)?;
        if tile_count == 0 {
            return Err(Error::invalid("TBC without tiles"));
        }

        Ok(TbcHeader { encoding_code, tile_count })
    }

    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, signature::TBC)?;
        u8::write_slice(write, signature::VERSION_1_0)?;
        self.encoding_code.write(write)?;
        self.tile_count.write(write)?;
        Ok(())
    }
}


/// Header of a block compressed MBC image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbcHeader {
    pub encoding_code: u32,
    pub width: u32,
    pub height: u32,
}

impl MbcHeader {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        expect(read, signature::MBC, "MBC signature")?;
        expect(read, signature::VERSION_1_0, "MBC version")?;

        let encoding_code = u32::read(read)?;
        let width = u32::read(read)?;
        let height = u32::read(read)?;
        if width == 0 || height == 0 {
            return Err(Error::invalid("MBC pixel size"));
        }

        Ok(MbcHeader { encoding_code, width, height })
    }

    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, signature::MBC)?;
        u8::write_slice(write, signature::VERSION_1_0)?;
        self.encoding_code.write(write)?;
        self.width.write(write)?;
        self.height.write(write)?;
        Ok(())
    }
}


/// Header of a JPEG compressed TIZ tileset. Decoding only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TizHeader {
    pub tile_count: u16,
}

impl TizHeader {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        expect(read, signature::TIZ, "TIZ signature")?;

        let tile_count = read_u16_be(read)?;
        if tile_count == 0 {
            return Err(Error::invalid("TIZ without tiles"));
        }

        skip_bytes(read, 2)?; // unused header bytes
        Ok(TizHeader { tile_count })
    }
}


/// Header of a JPEG compressed MOZ image. Decoding only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MozHeader {
    pub width: u16,
    pub height: u16,
}

impl MozHeader {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        expect(read, signature::MOZ, "MOZ signature")?;

        let width = read_u16_be(read)?;
        let height = read_u16_be(read)?;
        if width == 0 || height == 0 {
            return Err(Error::invalid("MOZ pixel size"));
        }

        Ok(MozHeader { width, height })
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tis_header_roundtrip(){
        let mut bytes = Vec::new();
        TisHeader::write(&mut bytes, 17).unwrap();
        assert_eq!(bytes.len(), 0x18);

        let header = TisHeader::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(header.tile_count, 17);
        assert!(!header.version_2);
    }

    #[test]
    fn tis_version_2_is_tolerated(){
        let mut bytes = Vec::new();
        TisHeader::write(&mut bytes, 2).unwrap();
        bytes[4 .. 8].copy_from_slice(signature::VERSION_2);

        let header = TisHeader::read(&mut bytes.as_slice()).unwrap();
        assert!(header.version_2);
    }

    #[test]
    fn tis_rejections(){
        let mut valid = Vec::new();
        TisHeader::write(&mut valid, 4).unwrap();

        let mut pvrz = valid.clone();
        pvrz[12 .. 16].copy_from_slice(&PVRZ_TILE_SIZE.to_le_bytes());
        assert!(matches!(TisHeader::read(&mut pvrz.as_slice()), Err(Error::NotSupported(_))));

        let mut no_tiles = valid.clone();
        no_tiles[8 .. 12].copy_from_slice(&[0; 4]);
        assert!(TisHeader::read(&mut no_tiles.as_slice()).is_err());

        let mut bad_version = valid.clone();
        bad_version[4 .. 8].copy_from_slice(b"V3  ");
        assert!(TisHeader::read(&mut bad_version.as_slice()).is_err());

        let mut bad_dimension = valid;
        bad_dimension[20 .. 24].copy_from_slice(&32_u32.to_le_bytes());
        assert!(TisHeader::read(&mut bad_dimension.as_slice()).is_err());
    }

    #[test]
    fn oversized_tis_headers_are_skipped(){
        let mut bytes = Vec::new();
        TisHeader::write(&mut bytes, 1).unwrap();
        bytes[16 .. 20].copy_from_slice(&0x20_u32.to_le_bytes());
        bytes.extend_from_slice(&[0xaa; 8]); // padding up to the header size

        let mut read = bytes.as_slice();
        TisHeader::read(&mut read).unwrap();
        assert!(read.is_empty(), "reader must stop right after the header");
    }

    #[test]
    fn headerless_tis_requires_exact_multiples(){
        assert_eq!(TisHeader::headerless(3 * RAW_TILE_SIZE).unwrap().tile_count, 3);
        assert!(TisHeader::headerless(3 * RAW_TILE_SIZE + 1).is_err());
        assert!(TisHeader::headerless(0).is_err());
    }

    #[test]
    fn mos_header_roundtrip(){
        let header = MosHeader::new(200, 65);
        assert_eq!(header.columns, 4);
        assert_eq!(header.rows, 2);
        assert_eq!(header.tile_count(), 8);

        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(MosHeader::read(&mut bytes.as_slice()).unwrap(), header);
    }

    #[test]
    fn mosc_roundtrip(){
        let mut mos = Vec::new();
        MosHeader::new(64, 64).write(&mut mos).unwrap();
        mos.resize(MosHeader::new(64, 64).expected_file_size(), 0x3c);

        let wrapped = wrap_mosc(&mos);
        assert_eq!(&wrapped[.. 4], signature::MOSC);
        assert_eq!(unwrap_mosc(&wrapped).unwrap(), mos);
    }

    #[test]
    fn tbc_and_mbc_header_roundtrip(){
        let tbc = TbcHeader { encoding_code: 0x101, tile_count: 9 };
        let mut bytes = Vec::new();
        tbc.write(&mut bytes).unwrap();
        assert_eq!(TbcHeader::read(&mut bytes.as_slice()).unwrap(), tbc);

        let mbc = MbcHeader { encoding_code: 2, width: 640, height: 480 };
        let mut bytes = Vec::new();
        mbc.write(&mut bytes).unwrap();
        assert_eq!(MbcHeader::read(&mut bytes.as_slice()).unwrap(), mbc);
    }

    #[test]
    fn big_endian_container_headers(){
        let mut tiz = Vec::new();
        tiz.extend_from_slice(signature::TIZ);
        tiz.extend_from_slice(&300_u16.to_be_bytes());
        tiz.extend_from_slice(&[0, 0]);
        assert_eq!(TizHeader::read(&mut tiz.as_slice()).unwrap().tile_count, 300);

        let mut moz = Vec::new();
        moz.extend_from_slice(signature::MOZ);
        moz.extend_from_slice(&320_u16.to_be_bytes());
        moz.extend_from_slice(&200_u16.to_be_bytes());

        let header = MozHeader::read(&mut moz.as_slice()).unwrap();
        assert_eq!((header.width, header.height), (320, 200));
    }

    #[test]
    fn archive_detection(){
        assert_eq!(detect_archive(b"TIS V1  "), Some(ArchiveKind::Tis));
        assert_eq!(detect_archive(b"MOSCV1  "), Some(ArchiveKind::Mosc));
        assert_eq!(detect_archive(b"TIZ0"), Some(ArchiveKind::Tiz));
        assert_eq!(detect_archive(b"BAM V1  "), None);
        assert_eq!(detect_archive(b"TI"), None);
    }

    #[test]
    fn tile_grid_geometry(){
        assert_eq!(tile_grid(64), 1);
        assert_eq!(tile_grid(65), 2);
        assert_eq!(tile_grid(1), 1);
        assert_eq!(edge_tile_dim(200, 3), 8);
        assert_eq!(edge_tile_dim(128, 0), 64);
    }
}
