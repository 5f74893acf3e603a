
//! The identity codec. Stores the palette and index bytes of a tile verbatim.

use crate::codec::TileCodec;
use crate::colors::PALETTE_SIZE;
use crate::error::{Error, Result};


pub struct RawCodec;

impl TileCodec for RawCodec {
    fn encoded_size(&self, width: usize, height: usize) -> usize {
        PALETTE_SIZE + width * height
    }

    fn encode(&self, palette: &[u8], indices: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
        if width == 0 || height == 0 {
            return Err(Error::invalid("tile with zero width or height"));
        }

        if palette.len() < PALETTE_SIZE || indices.len() != width * height {
            return Err(Error::invalid("tile data size"));
        }

        let mut encoded = Vec::with_capacity(self.encoded_size(width, height));
        encoded.extend_from_slice(&palette[.. PALETTE_SIZE]);
        encoded.extend_from_slice(indices);
        Ok(encoded)
    }

    fn decode(&self, payload: &[u8], width: usize, height: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        if width == 0 || height == 0 {
            return Err(Error::invalid("tile with zero width or height"));
        }

        if payload.len() < self.encoded_size(width, height) {
            return Err(Error::invalid("truncated tile payload"));
        }

        let palette = payload[.. PALETTE_SIZE].to_vec();
        let indices = payload[PALETTE_SIZE ..][.. width * height].to_vec();
        Ok((palette, indices))
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_then_decode_is_identity(){
        let palette: Vec<u8> = (0 .. PALETTE_SIZE).map(|index| (index % 251) as u8).collect();
        let indices: Vec<u8> = (0 .. 64 * 64).map(|index| (index % 256) as u8).collect();

        let encoded = RawCodec.encode(&palette, &indices, 64, 64).unwrap();
        assert_eq!(encoded.len(), 5120);

        let (decoded_palette, decoded_indices) = RawCodec.decode(&encoded, 64, 64).unwrap();
        assert_eq!(decoded_palette, palette);
        assert_eq!(decoded_indices, indices);
    }

    #[test]
    fn rejects_wrong_sizes(){
        assert!(RawCodec.encode(&[0; PALETTE_SIZE], &[0; 10], 64, 64).is_err());
        assert!(RawCodec.encode(&[0; 100], &[0; 64 * 64], 64, 64).is_err());
        assert!(RawCodec.encode(&[0; PALETTE_SIZE], &[], 0, 64).is_err());
        assert!(RawCodec.decode(&[0; 100], 64, 64).is_err());
    }
}
