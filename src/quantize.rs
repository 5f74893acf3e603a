
//! Color quantization of RGBA rasters to 256-entry palettes.
//!
//! Uses median-cut partitioning of the used colors. The decoding quality
//! setting selects extra processing: low qualities posterize the raster to
//! five bits per channel first, high qualities apply Floyd-Steinberg error
//! diffusion while mapping pixels to palette indices.

use std::collections::HashMap;

use crate::colors::{reorder_channels, ColorFormat, Pixel, PALETTE_SIZE, TRANSPARENT_PALETTE_ENTRY};


/// An indexed raster with its 256-entry BGRA palette.
/// Unused palette entries are zeroed.
pub struct QuantizedRaster {
    pub palette: Vec<u8>,
    pub indices: Vec<u8>,
}

/// Quantize an RGBA raster to at most 256 palette entries.
///
/// Pixels with an alpha below 128 are treated as fully transparent and
/// reserve palette slot zero, which is set to the pure green marker entry.
/// Quality ranges from 0 to 9.
pub fn quantize(pixels: &[Pixel], width: usize, quality: u8) -> QuantizedRaster {
    let has_transparency = pixels.iter().any(|pixel| pixel[3] < 128);

    let posterize = quality <= 2;
    let dither = quality >= 5;

    // count each used opaque color, posterized if requested
    let mut color_counts: HashMap<[u8; 3], u32> = HashMap::new();
    for pixel in pixels {
        if pixel[3] >= 128 {
            *color_counts.entry(opaque_color(pixel, posterize)).or_insert(0) += 1;
        }
    }

    let max_colors = if has_transparency { 255 } else { 256 };
    let colors = median_cut(color_counts, max_colors);

    let first_opaque_index = if has_transparency { 1 } else { 0 };

    let mut palette = vec![ 0_u8; PALETTE_SIZE ];
    for (index, &[r, g, b]) in colors.iter().enumerate() {
        let entry = &mut palette[(first_opaque_index + index) * 4 ..][.. 4];
        entry.copy_from_slice(&[ r, g, b, 0 ]);
    }

    reorder_channels(&mut palette, ColorFormat::Rgba, ColorFormat::Bgra);

    if has_transparency {
        palette[..4].copy_from_slice(&TRANSPARENT_PALETTE_ENTRY);
    }

    let indices = map_to_palette(
        pixels, width, &colors, first_opaque_index as u8,
        posterize, dither
    );

    QuantizedRaster { palette, indices }
}

fn opaque_color(pixel: &Pixel, posterize: bool) -> [u8; 3] {
    let mut color = [ pixel[0], pixel[1], pixel[2] ];
    if posterize {
        for channel in &mut color {
            // reduce to five bits, replicating the top bits into the bottom
            *channel = (*channel & 0xf8) | (*channel >> 5);
        }
    }

    color
}

/// Reduce the counted colors to at most `max_colors` representatives
/// by recursively splitting the box with the widest channel range.
fn median_cut(color_counts: HashMap<[u8; 3], u32>, max_colors: usize) -> Vec<[u8; 3]> {
    let mut colors: Vec<([u8; 3], u32)> = color_counts.into_iter().collect();
    if colors.is_empty() { return Vec::new(); }

    // deterministic box contents regardless of hash iteration order
    colors.sort_unstable();

    let mut boxes: Vec<Vec<([u8; 3], u32)>> = vec![ colors ];

    while boxes.len() < max_colors {
        // find the box with the widest channel range that can still be split
        let mut widest_box = None;
        let mut widest_range = 0_u16;
        let mut widest_channel = 0;

        for (box_index, colors) in boxes.iter().enumerate() {
            if colors.len() < 2 { continue; }

            for channel in 0 .. 3 {
                let min = colors.iter().map(|(color, _)| color[channel]).min().unwrap_or(0);
                let max = colors.iter().map(|(color, _)| color[channel]).max().unwrap_or(0);
                let range = (max - min) as u16;

                if widest_box.is_none() || range > widest_range {
                    widest_range = range;
                    widest_box = Some(box_index);
                    widest_channel = channel;
                }
            }
        }

        let Some(box_index) = widest_box else { break };

        let mut splitting = boxes.swap_remove(box_index);
        splitting.sort_unstable_by_key(|(color, _)| color[widest_channel]);

        // split at the weighted median of the chosen channel
        let total: u64 = splitting.iter().map(|(_, count)| *count as u64).sum();
        let mut accumulated = 0_u64;
        let mut split_at = 0;

        for (index, (_, count)) in splitting.iter().enumerate() {
            accumulated += *count as u64;
            if accumulated * 2 >= total {
                split_at = index + 1;
                break;
            }
        }

        split_at = split_at.clamp(1, splitting.len() - 1);

        let upper = splitting.split_off(split_at);
        boxes.push(splitting);
        boxes.push(upper);
    }

    boxes.iter().map(|colors| {
        // weighted average of the box contents
        let total: u64 = colors.iter().map(|(_, count)| *count as u64).sum();
        let mut sums = [ 0_u64; 3 ];

        for (color, count) in colors {
            for channel in 0 .. 3 {
                sums[channel] += color[channel] as u64 * *count as u64;
            }
        }

        [
            ((sums[0] + total / 2) / total) as u8,
            ((sums[1] + total / 2) / total) as u8,
            ((sums[2] + total / 2) / total) as u8,
        ]
    }).collect()
}

fn nearest_color(colors: &[[u8; 3]], target: [i32; 3]) -> usize {
    let mut best_index = 0;
    let mut best_error = i64::MAX;

    for (index, color) in colors.iter().enumerate() {
        let mut error = 0_i64;
        for channel in 0 .. 3 {
            let difference = (color[channel] as i32 - target[channel]) as i64;
            error += difference * difference;
        }

        if error < best_error {
            best_error = error;
            best_index = index;
        }
    }

    best_index
}

fn map_to_palette(
    pixels: &[Pixel], width: usize, colors: &[[u8; 3]],
    first_opaque_index: u8, posterize: bool, dither: bool,
) -> Vec<u8>
{
    let mut indices = Vec::with_capacity(pixels.len());
    if colors.is_empty() {
        indices.resize(pixels.len(), 0);
        return indices;
    }

    // two rows of per-channel quantization error for the diffusion filter
    let mut current_errors = vec![ [ 0_f32; 3 ]; width ];
    let mut next_errors = vec![ [ 0_f32; 3 ]; width ];

    for (pixel_index, pixel) in pixels.iter().enumerate() {
        let x = pixel_index % width;
        if x == 0 && pixel_index != 0 {
            std::mem::swap(&mut current_errors, &mut next_errors);
            for error in next_errors.iter_mut() { *error = [ 0.0; 3 ]; }
        }

        if pixel[3] < 128 {
            indices.push(0);
            continue;
        }

        let color = opaque_color(pixel, posterize);
        let mut target = [ 0_i32; 3 ];

        for channel in 0 .. 3 {
            let diffused = if dither { current_errors[x][channel] } else { 0.0 };
            target[channel] = (color[channel] as f32 + diffused).round().clamp(0.0, 255.0) as i32;
        }

        let color_index = nearest_color(colors, target);
        indices.push(first_opaque_index + color_index as u8);

        if dither {
            let chosen = colors[color_index];
            let mut error = [ 0_f32; 3 ];
            for channel in 0 .. 3 {
                error[channel] = target[channel] as f32 - chosen[channel] as f32;
            }

            // floyd-steinberg weights 7, 3, 5, 1 out of 16
            if x + 1 < width {
                for channel in 0 .. 3 {
                    current_errors[x + 1][channel] += error[channel] * 7.0 / 16.0;
                }
            }

            if x > 0 {
                for channel in 0 .. 3 {
                    next_errors[x - 1][channel] += error[channel] * 3.0 / 16.0;
                }
            }

            for channel in 0 .. 3 {
                next_errors[x][channel] += error[channel] * 5.0 / 16.0;
            }

            if x + 1 < width {
                for channel in 0 .. 3 {
                    next_errors[x + 1][channel] += error[channel] * 1.0 / 16.0;
                }
            }
        }
    }

    indices
}
