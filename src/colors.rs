
//! Pixel channel-order conversions and raster helpers.
//!
//! Archive palettes store their 256 entries as four bytes each, in BGRA
//! order. The block codecs work on RGBA bytes instead. All conversions
//! operate on flat byte buffers in groups of four.

use crate::error::{Error, Result};

/// One truecolor pixel as four bytes in RGBA order.
pub type Pixel = [u8; 4];

/// Number of bytes of a full 256-entry archive palette.
pub const PALETTE_SIZE: usize = 1024;


/// The in-memory byte order of a four-byte pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    /// Blue, green, red, alpha. The canonical order of archive palettes.
    Bgra,

    /// Red, green, blue, alpha. The native order of the block codecs.
    Rgba,

    /// Alpha, red, green, blue.
    Argb,

    /// Alpha, blue, green, red.
    Abgr,
}

impl ColorFormat {

    /// Byte positions of the blue, green, red and alpha channels in this order.
    fn channel_positions(self) -> [usize; 4] {
        match self {
            ColorFormat::Bgra => [0, 1, 2, 3],
            ColorFormat::Rgba => [2, 1, 0, 3],
            ColorFormat::Argb => [3, 2, 1, 0],
            ColorFormat::Abgr => [1, 2, 3, 0],
        }
    }
}

/// Reorder the channels of each four-byte pixel in the buffer in-place.
/// The buffer length must be a multiple of four.
pub fn reorder_channels(buffer: &mut [u8], from: ColorFormat, to: ColorFormat) {
    debug_assert_eq!(buffer.len() % 4, 0, "pixel buffer length must be a multiple of four");
    if from == to { return; }

    let source = from.channel_positions();
    let target = to.channel_positions();

    for pixel in buffer.chunks_exact_mut(4) {
        let mut reordered = [0_u8; 4];
        for channel in 0 .. 4 {
            reordered[target[channel]] = pixel[source[channel]];
        }

        pixel.copy_from_slice(&reordered);
    }
}


/// Whether palette slot zero marks transparent pixels.
/// The engine reserves pure green in slot zero for that purpose.
pub fn palette_has_transparency(palette: &[u8]) -> bool {
    palette.len() >= 4 && palette[..4] == [0x00, 0xff, 0x00, 0x00]
}

/// The palette entry reserved for transparent pixels, in BGRA order.
pub const TRANSPARENT_PALETTE_ENTRY: Pixel = [0x00, 0xff, 0x00, 0x00];

/// Expand an indexed raster to RGBA pixels using a BGRA archive palette.
/// Index zero becomes fully transparent if the palette reserves slot zero.
pub fn expand_indexed(palette: &[u8], indices: &[u8]) -> Result<Vec<Pixel>> {
    if palette.len() < PALETTE_SIZE {
        return Err(Error::invalid("palette too small"));
    }

    let transparent_zero = palette_has_transparency(palette);

    Ok(indices.iter().map(|&index| {
        if index == 0 && transparent_zero {
            [0, 0, 0, 0]
        }
        else {
            let entry = &palette[index as usize * 4 ..][.. 4];
            [entry[2], entry[1], entry[0], 255] // bgra entry to rgba pixel, alpha byte is unused
        }
    }).collect())
}


/// Pad an RGBA raster to the padded dimensions by
/// replicating the last row and column of pixels.
pub fn pad_raster(pixels: &[Pixel], width: usize, height: usize, padded_width: usize, padded_height: usize) -> Vec<Pixel> {
    debug_assert!(padded_width >= width && padded_height >= height, "pad target smaller than source");

    let mut padded = Vec::with_capacity(padded_width * padded_height);
    for y in 0 .. padded_height {
        let source_y = y.min(height - 1);
        for x in 0 .. padded_width {
            let source_x = x.min(width - 1);
            padded.push(pixels[source_y * width + source_x]);
        }
    }

    padded
}

/// Crop a padded RGBA raster back to the original dimensions.
pub fn crop_raster(pixels: &[Pixel], padded_width: usize, width: usize, height: usize) -> Vec<Pixel> {
    let mut cropped = Vec::with_capacity(width * height);
    for y in 0 .. height {
        cropped.extend_from_slice(&pixels[y * padded_width ..][.. width]);
    }

    cropped
}
