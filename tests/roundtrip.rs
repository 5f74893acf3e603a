
//! Whole file conversions, from archive bytes to archive bytes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tilebc::codec::Encoding;
use tilebc::convert::{self, Options};
use tilebc::error::Error;
use tilebc::format::{MosHeader, TisHeader, RAW_TILE_SIZE};


fn options(encoding: Encoding, deflate: bool) -> Options {
    Options { encoding, deflate, ..Options::default() }
}

/// A TIS file with random tile contents.
fn random_tis(tile_count: usize, random: &mut StdRng) -> Vec<u8> {
    let mut tis = Vec::with_capacity(0x18 + tile_count * RAW_TILE_SIZE);
    TisHeader::write(&mut tis, tile_count as u32).unwrap();

    for _ in 0 .. tile_count * RAW_TILE_SIZE {
        tis.push(random.gen_range(0 .. 256) as u8);
    }

    tis
}

/// A MOS file with random palettes and indices, including edge tiles.
fn random_mos(width: u16, height: u16, random: &mut StdRng) -> Vec<u8> {
    let header = MosHeader::new(width, height);

    let mut mos = Vec::with_capacity(header.expected_file_size());
    header.write(&mut mos).unwrap();

    for _ in 0 .. header.tile_count() * 1024 {
        mos.push(random.gen_range(0 .. 256) as u8);
    }

    // tile offsets in row-major order
    let mut offset = 0_u32;
    for row in 0 .. header.rows as usize {
        for column in 0 .. header.columns as usize {
            mos.extend_from_slice(&offset.to_le_bytes());

            let tile_width = (width as usize - column * 64).min(64);
            let tile_height = (height as usize - row * 64).min(64);
            offset += (tile_width * tile_height) as u32;
        }
    }

    for _ in 0 .. width as usize * height as usize {
        mos.push(random.gen_range(0 .. 256) as u8);
    }

    mos
}


#[test]
fn raw_tis_roundtrips_bit_exact(){
    let mut random = StdRng::seed_from_u64(2306);
    let tis = random_tis(7, &mut random);

    for deflate in [ false, true ] {
        let tbc = convert::tis_to_tbc(&tis, &options(Encoding::Raw, deflate), |_| {}).unwrap();
        let back = convert::tbc_to_tis(&tbc, &Options::default(), |_| {}).unwrap();
        assert_eq!(back, tis);
    }
}

#[test]
fn raw_mos_roundtrips_bit_exact(){
    let mut random = StdRng::seed_from_u64(1998);
    let mos = random_mos(130, 70, &mut random);

    let mbc = convert::mos_to_mbc(&mos, &options(Encoding::Raw, true), |_| {}).unwrap();
    let back = convert::mbc_to_mos(&mbc, &Options::default(), |_| {}).unwrap();
    assert_eq!(back, mos);
}

#[test]
fn mosc_input_and_output(){
    let mut random = StdRng::seed_from_u64(404);
    let mos = random_mos(64, 64, &mut random);
    let mosc = tilebc::format::wrap_mosc(&mos);

    // a compressed input image converts like its uncompressed form
    let from_mos = convert::mos_to_mbc(&mos, &options(Encoding::Raw, false), |_| {}).unwrap();
    let from_mosc = convert::mos_to_mbc(&mosc, &options(Encoding::Raw, false), |_| {}).unwrap();
    assert_eq!(from_mos, from_mosc);

    // requesting compressed output wraps the decoded image again
    let mosc_options = Options { mosc: true, ..Options::default() };
    let back = convert::mbc_to_mos(&from_mos, &mosc_options, |_| {}).unwrap();
    assert_eq!(&back[.. 4], b"MOSC");
    assert_eq!(tilebc::format::unwrap_mosc(&back).unwrap(), mos);
}

#[test]
fn bc1_single_tile_framing_and_palette(){
    // one solid color tile, the color survives rgb565 exactly
    let mut tis = Vec::new();
    TisHeader::write(&mut tis, 1).unwrap();

    let mut tile = vec![ 0_u8; RAW_TILE_SIZE ];
    tile[.. 4].copy_from_slice(&[ 247, 130, 247, 0 ]);
    tis.extend_from_slice(&tile);

    let encode_options = Options {
        encoding: Encoding::Bc1, deflate: false,
        encode_quality: 9, ..Options::default()
    };

    let tbc = convert::tis_to_tbc(&tis, &encode_options, |_| {}).unwrap();

    // 16 header bytes, then 4 tile header bytes and 2048 payload bytes
    assert_eq!(tbc.len(), 16 + 2052);

    let decode_options = Options { decode_quality: 9, ..Options::default() };
    let back = convert::tbc_to_tis(&tbc, &decode_options, |_| {}).unwrap();
    assert_eq!(back, tis);
}

#[test]
fn thread_counts_agree(){
    let mut random = StdRng::seed_from_u64(64);
    let tis = random_tis(1000, &mut random);

    let encoded: Vec<Vec<u8>> = [ 0, 8 ].iter().map(|&threads| {
        let options = Options { encoding: Encoding::Raw, threads, ..Options::default() };
        convert::tis_to_tbc(&tis, &options, |_| {}).unwrap()
    }).collect();

    assert_eq!(encoded[0], encoded[1]);

    let decoded: Vec<Vec<u8>> = [ 0, 8 ].iter().map(|&threads| {
        let options = Options { threads, ..Options::default() };
        convert::tbc_to_tis(&encoded[0], &options, |_| {}).unwrap()
    }).collect();

    assert_eq!(decoded[0], decoded[1]);
    assert_eq!(decoded[0], tis);
}

#[test]
fn block_compression_roundtrips_within_tolerance(){
    let mut random = StdRng::seed_from_u64(7);

    for encoding in [ Encoding::Bc1, Encoding::Bc2, Encoding::Bc3 ] {
        let tis = random_tis(2, &mut random);
        let tbc = convert::tis_to_tbc(&tis, &options(encoding, true), |_| {}).unwrap();
        let back = convert::tbc_to_tis(&tbc, &Options::default(), |_| {}).unwrap();

        // same layout, lossy pixels
        assert_eq!(back.len(), tis.len());
        assert_eq!(&back[.. 0x18], &tis[.. 0x18]);
    }
}

#[test]
fn headerless_tis_is_converted_when_requested(){
    let mut random = StdRng::seed_from_u64(33);
    let raw_tiles = random_tis(3, &mut random)[0x18 ..].to_vec();

    let refused = convert::convert_file(&raw_tiles, &Options::default(), |_| {});
    assert!(matches!(refused, Err(Error::Invalid(_))));

    let assume = Options { assume_tis: true, encoding: Encoding::Raw, ..Options::default() };
    let converted = convert::convert_file(&raw_tiles, &assume, |_| {}).unwrap();
    assert_eq!(converted.extension, "tbc");

    let back = convert::tbc_to_tis(&converted.output, &Options::default(), |_| {}).unwrap();
    assert_eq!(&back[0x18 ..], raw_tiles.as_slice());
}

#[test]
fn one_bad_tile_fails_the_whole_file(){
    let mut random = StdRng::seed_from_u64(91);
    let tis = random_tis(5, &mut random);

    // corrupt the deflate stream of the middle tile
    let mut tbc = convert::tis_to_tbc(&tis, &options(Encoding::Raw, true), |_| {}).unwrap();

    let mut offset = 16;
    for _ in 0 .. 2 {
        let size = u32::from_le_bytes(tbc[offset + 4 ..][.. 4].try_into().unwrap());
        offset += 8 + size as usize;
    }

    tbc[offset + 8] ^= 0xff;
    tbc[offset + 9] ^= 0xff;

    let result = convert::tbc_to_tis(&tbc, &Options::default(), |_| {});
    let message = result.err().map(|error| error.to_string()).unwrap_or_default();
    assert!(message.contains("tile 2"), "unexpected error: {}", message);
}

#[test]
fn broken_headers_are_rejected(){
    // a pvrz based tileset announces 12 byte tiles
    let mut pvrz = Vec::new();
    TisHeader::write(&mut pvrz, 4).unwrap();
    pvrz[12 .. 16].copy_from_slice(&0x000c_u32.to_le_bytes());

    let result = convert::convert_file(&pvrz, &Options::default(), |_| {});
    assert!(matches!(result, Err(Error::NotSupported(_))));

    let result = convert::convert_file(b"GIF89a...", &Options::default(), |_| {});
    assert!(matches!(result, Err(Error::Invalid(_))));
}

#[test]
fn progress_reaches_one(){
    let mut random = StdRng::seed_from_u64(5);
    let tis = random_tis(40, &mut random);

    let mut last = 0.0;
    convert::tis_to_tbc(&tis, &options(Encoding::Raw, false), |progress| {
        assert!(progress >= last, "progress went backwards");
        last = progress;
    }).unwrap();

    assert_eq!(last, 1.0);
}
