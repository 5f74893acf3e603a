
//! Whole archive conversion between the raster formats (TIS, MOS)
//! and their block compressed counterparts (TBC, MBC), plus decoding
//! of the JPEG based containers (TIZ, MOZ).
//!
//! Every conversion reads the complete input from a byte slice and
//! produces the complete output in memory. When any tile of a file
//! fails, the whole conversion fails and no output bytes are produced,
//! so a partially converted archive can never be written to disk.

use std::sync::Arc;

use miniz_oxide::deflate::compress_to_vec_zlib;
use zune_inflate::DeflateDecoder;

use crate::codec::{self, Encoding, TileCodec};
use crate::colors::PALETTE_SIZE;
use crate::error::{usize_to_u16, usize_to_u32, Error, Result};
use crate::format::{
    self, detect_archive, ArchiveKind, MbcHeader, MosHeader, MozHeader,
    TbcHeader, TisHeader, TizHeader, RAW_TILE_SIZE, TILE_DIM, TILE_HEADER_SIZE,
};
use crate::io::{u16_from_be_slice, Data};
use crate::pool::TilePool;


/// Compression level passed to the deflate implementation,
/// for the per tile streams as well as for MOSC output.
const DEFLATE_LEVEL: u8 = 4;


/// How to convert, independent of any specific input file.
#[derive(Debug, Clone)]
pub struct Options {

    /// Tile codec used when encoding to TBC or MBC.
    pub encoding: Encoding,

    /// Additionally wrap each encoded tile in a zlib stream.
    pub deflate: bool,

    /// Block compression effort, 0 is fastest and 9 is most thorough.
    pub encode_quality: u8,

    /// Color reduction effort when decoding, 0 is fastest and 9 is most thorough.
    pub decode_quality: u8,

    /// Worker threads for tile jobs. Zero selects the hardware parallelism.
    pub threads: usize,

    /// Treat files without any known signature as headerless TIS tiles.
    pub assume_tis: bool,

    /// Wrap decoded MOS output in the MOSC compression container.
    pub mosc: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            encoding: Encoding::Bc1,
            deflate: true,
            encode_quality: 9,
            decode_quality: 4,
            threads: 0,
            assume_tis: false,
            mosc: false,
        }
    }
}

impl Options {
    fn encode_quality(&self) -> u8 { self.encode_quality.min(9) }
    fn decode_quality(&self) -> u8 { self.decode_quality.min(9) }

    fn codec(&self, encoding: Encoding) -> Arc<dyn TileCodec> {
        Arc::from(codec::create_codec(encoding, self.encode_quality(), self.decode_quality()))
    }
}


/// The outcome of converting one file.
pub struct Conversion {
    pub output: Vec<u8>,

    /// The detected format of the input file.
    pub input: ArchiveKind,

    /// The conventional file name extension of the output format.
    pub extension: &'static str,
}

/// Detect the format of the file and convert it to its counterpart format.
/// The progress callback is called with values increasing from 0 to 1.
pub fn convert_file(bytes: &[u8], options: &Options, progress: impl FnMut(f64)) -> Result<Conversion> {
    let kind = match detect_archive(bytes) {
        Some(kind) => kind,

        None if options.assume_tis && TisHeader::headerless(bytes.len()).is_ok() =>
            ArchiveKind::Tis,

        None => return Err(Error::invalid("unknown archive signature")),
    };

    let (output, extension) = match kind {
        ArchiveKind::Tis => (tis_to_tbc(bytes, options, progress)?, "tbc"),
        ArchiveKind::Tbc => (tbc_to_tis(bytes, options, progress)?, "tis"),
        ArchiveKind::Mos | ArchiveKind::Mosc => (mos_to_mbc(bytes, options, progress)?, "mbc"),
        ArchiveKind::Mbc => (mbc_to_mos(bytes, options, progress)?, "mos"),
        ArchiveKind::Tiz => (tiz_to_tis(bytes, options, progress)?, "tis"),
        ArchiveKind::Moz => (moz_to_mos(bytes, options, progress)?, "mos"),
    };

    Ok(Conversion { output, input: kind, extension })
}


/// Encode a TIS tileset to a TBC file.
pub fn tis_to_tbc(bytes: &[u8], options: &Options, progress: impl FnMut(f64)) -> Result<Vec<u8>> {
    let mut read = bytes;

    let header = if bytes.starts_with(format::signature::TIS) {
        TisHeader::read(&mut read)?
    }
    else if options.assume_tis {
        TisHeader::headerless(bytes.len())?
    }
    else {
        return Err(Error::invalid("TIS signature"));
    };

    let codec = options.codec(options.encoding);
    if !codec.supports_encode() {
        return Err(Error::unsupported("encoding tiles with a decode-only codec"));
    }

    let tile_count = header.tile_count as usize;
    if read.len() < tile_count * RAW_TILE_SIZE {
        return Err(Error::invalid("truncated TIS file"));
    }

    let jobs = read.chunks_exact(RAW_TILE_SIZE)
        .take(tile_count)
        .map(|tile| {
            let tile = tile.to_vec();
            let codec = codec.clone();
            let deflate = options.deflate;

            boxed_job(move || encode_tile_block(
                codec.as_ref(), &tile[.. PALETTE_SIZE], &tile[PALETTE_SIZE ..],
                TILE_DIM, TILE_DIM, deflate
            ))
        })
        .collect();

    let blocks = run_tile_jobs(options, jobs, progress)?;

    let mut output = Vec::with_capacity(16 + blocks.iter().map(Vec::len).sum::<usize>());

    TbcHeader {
        encoding_code: codec::encoding_code(options.encoding, options.deflate),
        tile_count: header.tile_count,
    }.write(&mut output)?;

    for block in blocks { output.extend_from_slice(&block); }
    Ok(output)
}

/// Decode a TBC file back to a TIS tileset.
pub fn tbc_to_tis(bytes: &[u8], options: &Options, progress: impl FnMut(f64)) -> Result<Vec<u8>> {
    let mut read = bytes;
    let header = TbcHeader::read(&mut read)?;

    let encoding = Encoding::from_code(header.encoding_code)?;
    if encoding == Encoding::Jpeg {
        return Err(Error::unsupported("JPEG coded tiles outside of a TIZ or MOZ container"));
    }

    let deflated = codec::is_tile_deflated(header.encoding_code);
    let codec = options.codec(encoding);

    let mut jobs = Vec::with_capacity(header.tile_count as usize);
    for _ in 0 .. header.tile_count {
        let (width, height, payload) = read_tile_block(&mut read, codec.as_ref(), deflated)?;
        if width != TILE_DIM || height != TILE_DIM {
            return Err(Error::invalid("TIS tiles must be 64x64"));
        }

        let codec = codec.clone();
        jobs.push(boxed_job(move || decode_tile_block(codec.as_ref(), &payload, width, height, deflated)));
    }

    let tiles = run_tile_jobs(options, jobs, progress)?;

    let mut output = Vec::with_capacity(0x18 + tiles.len() * RAW_TILE_SIZE);
    TisHeader::write(&mut output, header.tile_count)?;

    for (palette, indices) in tiles {
        output.extend_from_slice(&palette);
        output.extend_from_slice(&indices);
    }

    Ok(output)
}

/// Encode a MOS or MOSC image to an MBC file.
pub fn mos_to_mbc(bytes: &[u8], options: &Options, progress: impl FnMut(f64)) -> Result<Vec<u8>> {
    let unwrapped;
    let mos = if bytes.starts_with(format::signature::MOSC) {
        unwrapped = format::unwrap_mosc(bytes)?;
        unwrapped.as_slice()
    }
    else {
        bytes
    };

    let mut read = mos;
    let header = MosHeader::read(&mut read)?;
    if mos.len() < header.expected_file_size() {
        return Err(Error::invalid("truncated MOS file"));
    }

    let codec = options.codec(options.encoding);
    if !codec.supports_encode() {
        return Err(Error::unsupported("encoding tiles with a decode-only codec"));
    }

    let columns = format::tile_grid(header.width as usize);
    let rows = format::tile_grid(header.height as usize);
    let tile_count = columns * rows;

    let palettes_start = header.palette_offset as usize;
    let offsets_start = palettes_start + tile_count * PALETTE_SIZE;
    let data_start = offsets_start + tile_count * 4;

    let mut offsets_read = &mos[offsets_start ..];
    let tile_offsets = u32::read_vec(&mut offsets_read, tile_count)?;

    let mut jobs = Vec::with_capacity(tile_count);
    for row in 0 .. rows {
        for column in 0 .. columns {
            let tile_index = row * columns + column;
            let width = format::edge_tile_dim(header.width as usize, column);
            let height = format::edge_tile_dim(header.height as usize, row);

            let palette = mos.get(palettes_start + tile_index * PALETTE_SIZE ..)
                .and_then(|bytes| bytes.get(.. PALETTE_SIZE))
                .ok_or_else(|| Error::invalid("truncated MOS palette data"))?
                .to_vec();

            let indices = mos.get(data_start + tile_offsets[tile_index] as usize ..)
                .and_then(|bytes| bytes.get(.. width * height))
                .ok_or_else(|| Error::invalid("truncated MOS tile data"))?
                .to_vec();

            let codec = codec.clone();
            let deflate = options.deflate;
            jobs.push(boxed_job(move || encode_tile_block(
                codec.as_ref(), &palette, &indices, width, height, deflate
            )));
        }
    }

    let blocks = run_tile_jobs(options, jobs, progress)?;

    let mut output = Vec::with_capacity(20 + blocks.iter().map(Vec::len).sum::<usize>());

    MbcHeader {
        encoding_code: codec::encoding_code(options.encoding, options.deflate),
        width: header.width as u32,
        height: header.height as u32,
    }.write(&mut output)?;

    for block in blocks { output.extend_from_slice(&block); }
    Ok(output)
}

/// Decode an MBC file back to a MOS image,
/// optionally wrapped as MOSC.
pub fn mbc_to_mos(bytes: &[u8], options: &Options, progress: impl FnMut(f64)) -> Result<Vec<u8>> {
    let mut read = bytes;
    let header = MbcHeader::read(&mut read)?;

    let encoding = Encoding::from_code(header.encoding_code)?;
    if encoding == Encoding::Jpeg {
        return Err(Error::unsupported("JPEG coded tiles outside of a TIZ or MOZ container"));
    }

    let deflated = codec::is_tile_deflated(header.encoding_code);
    let codec = options.codec(encoding);

    let width = header.width as usize;
    let height = header.height as usize;
    if width > u16::MAX as usize || height > u16::MAX as usize {
        return Err(Error::invalid("MBC pixel size"));
    }

    let columns = format::tile_grid(width);
    let rows = format::tile_grid(height);

    let mut jobs = Vec::with_capacity(columns * rows);
    for row in 0 .. rows {
        for column in 0 .. columns {
            let (tile_width, tile_height, payload) = read_tile_block(&mut read, codec.as_ref(), deflated)?;

            let expected_width = format::edge_tile_dim(width, column);
            let expected_height = format::edge_tile_dim(height, row);
            if tile_width != expected_width || tile_height != expected_height {
                return Err(Error::invalid("MBC tile dimensions do not match the image layout"));
            }

            let codec = codec.clone();
            jobs.push(boxed_job(move || decode_tile_block(
                codec.as_ref(), &payload, tile_width, tile_height, deflated
            )));
        }
    }

    let tiles = run_tile_jobs(options, jobs, progress)?;
    let mos = assemble_mos(usize_to_u16(width), usize_to_u16(height), &tiles)?;
    Ok(if options.mosc { format::wrap_mosc(&mos) } else { mos })
}

/// Decode a TIZ container to a TIS tileset.
pub fn tiz_to_tis(bytes: &[u8], options: &Options, progress: impl FnMut(f64)) -> Result<Vec<u8>> {
    let mut read = bytes;
    let header = TizHeader::read(&mut read)?;
    let codec = options.codec(Encoding::Jpeg);

    let mut jobs = Vec::with_capacity(header.tile_count as usize);
    for _ in 0 .. header.tile_count {
        let frame = read_til_frame(&mut read, false)?;
        let codec = codec.clone();
        jobs.push(boxed_job(move || codec.decode(&frame, TILE_DIM, TILE_DIM)));
    }

    let tiles = run_tile_jobs(options, jobs, progress)?;

    let mut output = Vec::with_capacity(0x18 + tiles.len() * RAW_TILE_SIZE);
    TisHeader::write(&mut output, header.tile_count as u32)?;

    for (palette, indices) in tiles {
        output.extend_from_slice(&palette);
        output.extend_from_slice(&indices);
    }

    Ok(output)
}

/// Decode a MOZ container to a MOS image,
/// optionally wrapped as MOSC.
pub fn moz_to_mos(bytes: &[u8], options: &Options, progress: impl FnMut(f64)) -> Result<Vec<u8>> {
    let mut read = bytes;
    let header = MozHeader::read(&mut read)?;
    let codec = options.codec(Encoding::Jpeg);

    let width = header.width as usize;
    let height = header.height as usize;
    let columns = format::tile_grid(width);
    let rows = format::tile_grid(height);

    let mut jobs = Vec::with_capacity(columns * rows);
    for row in 0 .. rows {
        for column in 0 .. columns {
            let frame = read_til_frame(&mut read, true)?;
            let tile_width = format::edge_tile_dim(width, column);
            let tile_height = format::edge_tile_dim(height, row);

            let codec = codec.clone();
            jobs.push(boxed_job(move || codec.decode(&frame, tile_width, tile_height)));
        }
    }

    let tiles = run_tile_jobs(options, jobs, progress)?;
    let mos = assemble_mos(header.width, header.height, &tiles)?;
    Ok(if options.mosc { format::wrap_mosc(&mos) } else { mos })
}


// --- per tile framing ---

/// Encode one tile and frame it as written into TBC and MBC files:
/// the pixel size, then either the plain payload, or the compressed
/// payload behind its length.
fn encode_tile_block(
    codec: &dyn TileCodec, palette: &[u8], indices: &[u8],
    width: usize, height: usize, deflate: bool,
) -> Result<Vec<u8>>
{
    let payload = codec.encode(palette, indices, width, height)?;

    let mut block = Vec::with_capacity(TILE_HEADER_SIZE + 4 + payload.len());
    usize_to_u16(width).write(&mut block)?;
    usize_to_u16(height).write(&mut block)?;

    if deflate {
        let compressed = compress_to_vec_zlib(&payload, DEFLATE_LEVEL);
        usize_to_u32(compressed.len()).write(&mut block)?;
        block.extend_from_slice(&compressed);
    }
    else {
        block.extend_from_slice(&payload);
    }

    Ok(block)
}

/// Read one tile block. The payload size is taken from the length
/// prefix for deflated tiles, and computed from the codec otherwise.
fn read_tile_block(read: &mut &[u8], codec: &dyn TileCodec, deflated: bool) -> Result<(usize, usize, Vec<u8>)> {
    let width = u16::read(read)? as usize;
    let height = u16::read(read)? as usize;
    if width == 0 || height == 0 {
        return Err(Error::invalid("tile with zero width or height"));
    }

    let size = if deflated { u32::read(read)? as usize }
        else { codec.encoded_size(width, height) };

    if size == 0 || size > read.len() {
        return Err(Error::invalid("truncated tile block"));
    }

    Ok((width, height, u8::read_vec(read, size)?))
}

/// Inflate a tile payload if necessary, then decode it.
fn decode_tile_block(
    codec: &dyn TileCodec, payload: &[u8],
    width: usize, height: usize, deflated: bool,
) -> Result<(Vec<u8>, Vec<u8>)>
{
    if deflated {
        let inflated = DeflateDecoder::new(payload).decode_zlib()
            .map_err(|error| Error::invalid(format!("tile deflate: {:?}", error)))?;

        codec.decode(&inflated, width, height)
    }
    else {
        codec.decode(payload, width, height)
    }
}

/// Read one TIL chunk of a TIZ or MOZ container, including its
/// signature and length bytes, as the JPEG codec consumes it.
fn read_til_frame(read: &mut &[u8], jpeg_only: bool) -> Result<Vec<u8>> {
    if read.len() < 6 {
        return Err(Error::invalid("truncated tile chunk"));
    }

    let accepted = if jpeg_only { read[.. 4] == *b"TIL2" }
        else { read.starts_with(b"TIL") };

    if !accepted {
        return Err(Error::invalid("unknown tile chunk signature"));
    }

    let size = 6 + u16_from_be_slice(&read[4 .. 6])? as usize;
    if read.len() < size {
        return Err(Error::invalid("truncated tile chunk"));
    }

    let frame = read[.. size].to_vec();
    *read = &read[size ..];
    Ok(frame)
}

/// Write a complete MOS file from decoded tiles in row-major order.
fn assemble_mos(width: u16, height: u16, tiles: &[(Vec<u8>, Vec<u8>)]) -> Result<Vec<u8>> {
    let header = MosHeader::new(width, height);

    let mut output = Vec::with_capacity(header.expected_file_size());
    header.write(&mut output)?;

    for (palette, _) in tiles {
        output.extend_from_slice(palette);
    }

    let mut data_offset = 0_u32;
    for (_, indices) in tiles {
        data_offset.write(&mut output)?;
        data_offset += usize_to_u32(indices.len());
    }

    for (_, indices) in tiles {
        output.extend_from_slice(indices);
    }

    Ok(output)
}


// --- job execution ---

type TileJob<T> = Box<dyn FnOnce() -> Result<T> + Send>;

fn boxed_job<T, Job>(job: Job) -> TileJob<T>
    where Job: FnOnce() -> Result<T> + Send + 'static
{
    Box::new(job)
}

/// Run all tile jobs on a pool, reporting progress between batches.
/// The first tile error fails the whole file.
fn run_tile_jobs<T>(
    options: &Options, mut jobs: Vec<TileJob<T>>,
    mut progress: impl FnMut(f64),
) -> Result<Vec<T>>
    where T: Send + 'static
{
    let pool = TilePool::new(options.threads);
    let batch_size = (pool.thread_count() * 8).max(16);

    let total = jobs.len();
    let mut outputs = Vec::with_capacity(total);

    while !jobs.is_empty() {
        let remaining = jobs.split_off(batch_size.min(jobs.len()));
        let batch = std::mem::replace(&mut jobs, remaining);

        for result in pool.process(batch) {
            match result {
                Ok(output) => outputs.push(output),
                Err(error) => return Err(tile_error(outputs.len(), error)),
            }
        }

        progress(outputs.len() as f64 / total as f64);
    }

    Ok(outputs)
}

/// Attach the index of the failed tile to its error message.
fn tile_error(tile_index: usize, error: Error) -> Error {
    match error {
        Error::Io(error) => Error::Io(error),
        Error::Invalid(message) => Error::invalid(format!("tile {}: {}", tile_index, message)),
        Error::NotSupported(message) => Error::unsupported(format!("tile {}: {}", tile_index, message)),
    }
}
