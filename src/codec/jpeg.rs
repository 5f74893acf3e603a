
//! Decoding of the JPEG based tiles found in TIZ and MOZ files.
//!
//! The payload of such a tile is a complete TIL chunk, starting with one
//! of the signatures `TIL0`, `TIL1` or `TIL2` and a big endian chunk size.
//! This codec only decodes. Encoding tiles as JPEG is not supported.

use zune_inflate::DeflateDecoder;
use zune_jpeg::zune_core::colorspace::ColorSpace;
use zune_jpeg::zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

use crate::codec::TileCodec;
use crate::colors::PALETTE_SIZE;
use crate::error::{Error, Result};
use crate::io::u16_from_be_slice;
use crate::quantize;


/// Bytes of the inflated TIL1 mask region:
/// a 768 byte RGB palette followed by a 512 byte alpha bitmask.
const TIL1_MASK_REGION: usize = 768 + 512;


pub struct JpegCodec {
    pub decode_quality: u8,
}

impl TileCodec for JpegCodec {

    // chunks carry their own length, this size is never used for reading
    fn encoded_size(&self, _width: usize, _height: usize) -> usize { 0 }

    fn supports_encode(&self) -> bool { false }

    fn encode(&self, _palette: &[u8], _indices: &[u8], _width: usize, _height: usize) -> Result<Vec<u8>> {
        Err(Error::unsupported("encoding tiles as JPEG"))
    }

    fn decode(&self, payload: &[u8], width: usize, height: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        if payload.len() < 6 {
            return Err(Error::invalid("truncated tile chunk"));
        }

        let chunk_size = u16_from_be_slice(&payload[4 .. 6])? as usize;
        let chunk = payload.get(6 .. 6 + chunk_size)
            .ok_or_else(|| Error::invalid("truncated tile chunk"))?;

        match &payload[.. 4] {
            b"TIL0" => self.decode_stored(chunk, width, height),
            b"TIL1" => self.decode_masked_jpeg(chunk, width, height),
            b"TIL2" => self.decode_jpeg(chunk, None, width, height),
            _ => Err(Error::invalid("unknown tile chunk signature")),
        }
    }
}

impl JpegCodec {

    /// A `TIL0` chunk is a zlib stream of the verbatim
    /// palette and index bytes of one full size tile.
    fn decode_stored(&self, chunk: &[u8], width: usize, height: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        if width != 64 || height != 64 {
            return Err(Error::invalid("stored tile chunks are always 64x64"));
        }

        let inflated = DeflateDecoder::new(chunk).decode_zlib()
            .map_err(|error| Error::invalid(format!("tile chunk deflate: {:?}", error)))?;

        if inflated.len() < PALETTE_SIZE + 64 * 64 {
            return Err(Error::invalid("tile chunk too small after inflating"));
        }

        let palette = inflated[.. PALETTE_SIZE].to_vec();
        let indices = inflated[PALETTE_SIZE ..][.. 64 * 64].to_vec();
        Ok((palette, indices))
    }

    /// A `TIL1` chunk holds a zlib stream with an alpha bitmask,
    /// followed by the JPEG data of the opaque pixels.
    fn decode_masked_jpeg(&self, chunk: &[u8], width: usize, height: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        if chunk.len() < 2 {
            return Err(Error::invalid("truncated tile chunk"));
        }

        let mask_size = u16_from_be_slice(&chunk[.. 2])? as usize;
        let mask_data = chunk.get(2 .. 2 + mask_size)
            .ok_or_else(|| Error::invalid("truncated tile chunk"))?;

        let jpeg_data = &chunk[2 + mask_size ..];
        if jpeg_data.is_empty() {
            return Err(Error::invalid("tile chunk without image data"));
        }

        let inflated = DeflateDecoder::new(mask_data).decode_zlib()
            .map_err(|error| Error::invalid(format!("tile chunk deflate: {:?}", error)))?;

        if inflated.len() < TIL1_MASK_REGION {
            return Err(Error::invalid("tile alpha mask too small"));
        }

        // the stored rgb palette is skipped, only the bitmask is used
        let mask = &inflated[768 .. TIL1_MASK_REGION];
        self.decode_jpeg(jpeg_data, Some(mask), width, height)
    }

    fn decode_jpeg(&self, jpeg_data: &[u8], mask: Option<&[u8]>, width: usize, height: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
        let mut decoder = JpegDecoder::new_with_options(jpeg_data, options);

        let bytes = decoder.decode()
            .map_err(|error| Error::invalid(format!("tile jpeg: {:?}", error)))?;

        let (jpeg_width, jpeg_height) = decoder.dimensions()
            .ok_or_else(|| Error::invalid("tile jpeg without dimensions"))?;

        if jpeg_width != width || jpeg_height != height {
            return Err(Error::invalid("tile jpeg dimensions do not match the archive layout"));
        }

        if bytes.len() < width * height * 4 {
            return Err(Error::invalid("tile jpeg decoded to too few bytes"));
        }

        let mut pixels: Vec<[u8; 4]> = bytes.chunks_exact(4)
            .take(width * height)
            .map(|pixel| [ pixel[0], pixel[1], pixel[2], pixel[3] ])
            .collect();

        if let Some(mask) = mask {
            // one bit per pixel, counted from the most significant bit,
            // a zero bit marks a transparent pixel
            for (index, pixel) in pixels.iter_mut().enumerate() {
                let byte = index >> 3;
                let bit = 7 - (index & 7);

                if byte < mask.len() && (mask[byte] >> bit) & 1 == 0 {
                    *pixel = [ 0, 0, 0, 0 ];
                }
            }
        }

        let quantized = quantize::quantize(&pixels, width, self.decode_quality);
        Ok((quantized.palette, quantized.indices))
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use miniz_oxide::deflate::compress_to_vec_zlib;

    fn stored_chunk(palette: &[u8], indices: &[u8]) -> Vec<u8> {
        let mut raster = palette.to_vec();
        raster.extend_from_slice(indices);
        let deflated = compress_to_vec_zlib(&raster, 4);

        let mut chunk = b"TIL0".to_vec();
        chunk.extend_from_slice(&(deflated.len() as u16).to_be_bytes());
        chunk.extend_from_slice(&deflated);
        chunk
    }

    #[test]
    fn stored_chunks_inflate_to_the_original_raster(){
        let palette: Vec<u8> = (0 .. PALETTE_SIZE).map(|index| (index % 253) as u8).collect();
        let indices: Vec<u8> = (0 .. 64 * 64).map(|index| (index % 251) as u8).collect();

        let codec = JpegCodec { decode_quality: 9 };
        let (decoded_palette, decoded_indices) = codec
            .decode(&stored_chunk(&palette, &indices), 64, 64).unwrap();

        assert_eq!(decoded_palette, palette);
        assert_eq!(decoded_indices, indices);
    }

    #[test]
    fn stored_chunks_must_be_full_size(){
        let codec = JpegCodec { decode_quality: 9 };
        let chunk = stored_chunk(&[0; PALETTE_SIZE], &[0; 64 * 64]);
        assert!(codec.decode(&chunk, 32, 64).is_err());
    }

    #[test]
    fn encoding_is_rejected(){
        let codec = JpegCodec { decode_quality: 9 };
        assert!(!codec.supports_encode());

        let result = codec.encode(&[0; PALETTE_SIZE], &[0; 64 * 64], 64, 64);
        assert!(matches!(result, Err(Error::NotSupported(_))));
    }

    #[test]
    fn unknown_chunk_signatures_are_rejected(){
        let codec = JpegCodec { decode_quality: 9 };
        assert!(codec.decode(b"TIL9\x00\x00", 64, 64).is_err());
        assert!(codec.decode(b"TIL0", 64, 64).is_err());
    }
}
