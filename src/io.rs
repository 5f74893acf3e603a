
//! Specialized binary input and output.
//! Uses the error handling for this crate.

pub use std::io::{Read, Write};
use lebe::prelude::*;
use crate::error::{Error, Result, UnitResult};

/// Skip reading uninteresting bytes without allocating.
#[inline]
pub fn skip_bytes(read: &mut impl Read, count: usize) -> UnitResult {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count as u64),
        &mut std::io::sink()
    )?;

    if skipped != count as u64 {
        return Err(Error::invalid("reading more bytes than available"))
    }

    Ok(())
}

/// Generic trait that defines common binary operations such as reading and writing for this type.
/// All multi-byte integers are stored little-endian, as the archive formats demand.
pub trait Data: Sized + Default + Clone {
    const BYTE_SIZE: usize = std::mem::size_of::<Self>();

    /// Read a value of type `Self`.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Read as many values of type `Self` as fit into the specified slice.
    /// If the slice cannot be filled completely, returns `Error::Invalid`.
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult;

    /// Write this value to the writer.
    fn write(self, write: &mut impl Write) -> UnitResult;

    /// Write all values of that slice to the writer.
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;

    /// Read the specified number of values into a new vector.
    /// Returns `Error::Invalid` if the reader does not contain the desired number of elements.
    #[inline]
    fn read_vec(read: &mut impl Read, count: usize) -> Result<Vec<Self>> {
        let mut vec = vec![Self::default(); count];
        Self::read_slice(read, &mut vec)?;
        Ok(vec)
    }
}

macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            #[inline]
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_little_endian()?)
            }

            #[inline]
            fn write(self, write: &mut impl Write) -> UnitResult {
                write.write_as_little_endian(&self)?;
                Ok(())
            }

            #[inline]
            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult {
                read.read_from_little_endian_into(slice)?;
                Ok(())
            }

            #[inline]
            fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult {
                write.write_as_little_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);


/// Read a big-endian `u16`. The TIZ/MOZ containers store their
/// few header fields big-endian, unlike every other archive type.
#[inline]
pub fn read_u16_be(read: &mut impl Read) -> Result<u16> {
    let mut bytes = [0_u8; 2];
    u8::read_slice(read, &mut bytes)?;
    Ok(u16::from_be_bytes(bytes))
}

/// Interpret the first two bytes of the slice as a big-endian `u16`.
#[inline]
pub fn u16_from_be_slice(bytes: &[u8]) -> Result<u16> {
    let bytes: [u8; 2] = bytes.get(..2)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| Error::invalid("reading more bytes than available"))?;

    Ok(u16::from_be_bytes(bytes))
}
