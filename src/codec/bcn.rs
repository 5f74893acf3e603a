
//! Block compression of tiles as BC1, BC2 or BC3 data.
//!
//! Encoding fits every 4x4 block of pixels to two RGB565 endpoints and a
//! two bit index per pixel, plus the alpha channel for BC2 and BC3.
//! The encoding quality setting selects how hard the fit works:
//! 0 to 2 project the block onto its principal axis, 3 to 6 additionally
//! refine the endpoints once by least squares, 7 to 9 iterate that
//! refinement. From quality 5 on, errors are weighted by pixel alpha.
//!
//! A refined candidate only ever replaces the current best fit when its
//! error is strictly smaller, so raising the quality never raises the error.

use crate::codec::TileCodec;
use crate::colors::{self, Pixel};
use crate::error::{Error, Result};
use crate::quantize;


/// Which of the three block compression formats a codec instance produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BcFormat { Bc1, Bc2, Bc3 }

impl BcFormat {

    /// Encoded bytes per 4x4 block.
    pub fn block_size(self) -> usize {
        match self {
            BcFormat::Bc1 => 8,
            BcFormat::Bc2 | BcFormat::Bc3 => 16,
        }
    }
}


pub struct BcnCodec {
    format: BcFormat,
    encode_quality: u8,
    decode_quality: u8,
}

impl BcnCodec {
    pub fn new(format: BcFormat, encode_quality: u8, decode_quality: u8) -> Self {
        Self { format, encode_quality, decode_quality }
    }
}

/// Round a dimension up to the next multiple of four.
fn padded(dimension: usize) -> usize {
    (dimension + 3) & !3
}

impl TileCodec for BcnCodec {
    fn encoded_size(&self, width: usize, height: usize) -> usize {
        padded(width) * padded(height) / 16 * self.format.block_size()
    }

    fn encode(&self, palette: &[u8], indices: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
        if width == 0 || height == 0 {
            return Err(Error::invalid("tile with zero width or height"));
        }

        if indices.len() != width * height {
            return Err(Error::invalid("tile data size"));
        }

        let pixels = colors::expand_indexed(palette, indices)?;

        let padded_width = padded(width);
        let padded_height = padded(height);
        let pixels = colors::pad_raster(&pixels, width, height, padded_width, padded_height);

        let mut encoded = Vec::with_capacity(self.encoded_size(width, height));

        for block_y in 0 .. padded_height / 4 {
            for block_x in 0 .. padded_width / 4 {
                let mut block = [ [0_u8; 4]; 16 ];
                for y in 0 .. 4 {
                    for x in 0 .. 4 {
                        block[y * 4 + x] = pixels[(block_y * 4 + y) * padded_width + block_x * 4 + x];
                    }
                }

                encode_block(self.format, self.encode_quality, &block, &mut encoded);
            }
        }

        Ok(encoded)
    }

    fn decode(&self, payload: &[u8], width: usize, height: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        if width == 0 || height == 0 {
            return Err(Error::invalid("tile with zero width or height"));
        }

        if payload.len() < self.encoded_size(width, height) {
            return Err(Error::invalid("truncated tile payload"));
        }

        let padded_width = padded(width);
        let padded_height = padded(height);
        let mut pixels = vec![ [0_u8; 4]; padded_width * padded_height ];

        let block_size = self.format.block_size();
        let mut blocks = payload.chunks_exact(block_size);

        for block_y in 0 .. padded_height / 4 {
            for block_x in 0 .. padded_width / 4 {
                let block = blocks.next().ok_or_else(|| Error::invalid("truncated tile payload"))?;

                let mut decoded = [ [0_u8; 4]; 16 ];
                decode_block(self.format, block, &mut decoded);

                for y in 0 .. 4 {
                    for x in 0 .. 4 {
                        pixels[(block_y * 4 + y) * padded_width + block_x * 4 + x] = decoded[y * 4 + x];
                    }
                }
            }
        }

        let pixels = colors::crop_raster(&pixels, padded_width, width, height);
        let quantized = quantize::quantize(&pixels, width, self.decode_quality);
        Ok((quantized.palette, quantized.indices))
    }
}


// --- rgb565 endpoints ---

fn pack_565(color: [f32; 3]) -> u16 {
    let r = ((color[0].clamp(0.0, 255.0) * 31.0 / 255.0).round() as u16).min(31);
    let g = ((color[1].clamp(0.0, 255.0) * 63.0 / 255.0).round() as u16).min(63);
    let b = ((color[2].clamp(0.0, 255.0) * 31.0 / 255.0).round() as u16).min(31);
    (r << 11) | (g << 5) | b
}

fn unpack_565(color: u16) -> [u8; 3] {
    let r = ((color >> 11) & 0x1f) as u8;
    let g = ((color >> 5) & 0x3f) as u8;
    let b = (color & 0x1f) as u8;

    [
        (r << 3) | (r >> 2),
        (g << 2) | (g >> 4),
        (b << 3) | (b >> 2),
    ]
}

/// The four colors selected by a color block.
/// BC1 blocks with `endpoint0 <= endpoint1` use the three color
/// mode where index three means transparent black.
fn block_colors(endpoint0: u16, endpoint1: u16, three_color: bool) -> [[u8; 3]; 4] {
    let color0 = unpack_565(endpoint0);
    let color1 = unpack_565(endpoint1);

    let mut interpolated = [ color0, color1, [0; 3], [0; 3] ];

    for channel in 0 .. 3 {
        let first = color0[channel] as u16;
        let second = color1[channel] as u16;

        if three_color {
            interpolated[2][channel] = ((first + second) / 2) as u8;
        }
        else {
            interpolated[2][channel] = ((2 * first + second) / 3) as u8;
            interpolated[3][channel] = ((first + 2 * second) / 3) as u8;
        }
    }

    interpolated
}


// --- decoding ---

fn decode_block(format: BcFormat, block: &[u8], pixels: &mut [Pixel; 16]) {
    let color_block = match format {
        BcFormat::Bc1 => &block[.. 8],
        BcFormat::Bc2 | BcFormat::Bc3 => &block[8 .. 16],
    };

    let endpoint0 = u16::from_le_bytes([ color_block[0], color_block[1] ]);
    let endpoint1 = u16::from_le_bytes([ color_block[2], color_block[3] ]);

    // only bc1 has the three color mode, the other formats always interpolate
    let three_color = format == BcFormat::Bc1 && endpoint0 <= endpoint1;
    let colors = block_colors(endpoint0, endpoint1, three_color);
    let alphas = alpha_table(block[0], block[1]);

    for pixel in 0 .. 16 {
        let bits = (color_block[4 + pixel / 4] >> ((pixel % 4) * 2)) & 0b11;
        let [r, g, b] = colors[bits as usize];

        let alpha = match format {
            BcFormat::Bc1 =>
                if three_color && bits == 3 { 0 } else { 255 },

            BcFormat::Bc2 => {
                let nibble = (block[pixel / 2] >> ((pixel % 2) * 4)) & 0x0f;
                nibble | (nibble << 4)
            },

            BcFormat::Bc3 => {
                let bits = read_alpha_bits(&block[2 .. 8], pixel * 3);
                alphas[bits as usize]
            },
        };

        pixels[pixel] = [ r, g, b, alpha ];
    }
}

/// The eight alpha values selected by a BC3 alpha block.
fn alpha_table(alpha0: u8, alpha1: u8) -> [u8; 8] {
    let first = alpha0 as u16;
    let second = alpha1 as u16;
    let mut table = [ alpha0, alpha1, 0, 0, 0, 0, 0, 0 ];

    if alpha0 > alpha1 {
        for step in 2 .. 8 {
            table[step] = (((8 - step as u16) * first + (step as u16 - 1) * second) / 7) as u8;
        }
    }
    else {
        for step in 2 .. 6 {
            table[step] = (((6 - step as u16) * first + (step as u16 - 1) * second) / 5) as u8;
        }

        table[6] = 0;
        table[7] = 255;
    }

    table
}

fn read_alpha_bits(bytes: &[u8], bit_offset: usize) -> u8 {
    let mut bits = 0_u8;
    for bit in 0 .. 3 {
        let position = bit_offset + bit;
        bits |= ((bytes[position / 8] >> (position % 8)) & 1) << bit;
    }

    bits
}


// --- encoding ---

fn encode_block(format: BcFormat, quality: u8, pixels: &[Pixel; 16], encoded: &mut Vec<u8>) {
    match format {
        BcFormat::Bc2 => {
            for pair in 0 .. 8 {
                let low = pixels[pair * 2][3] >> 4;
                let high = pixels[pair * 2 + 1][3] >> 4;
                encoded.push(low | (high << 4));
            }
        },

        BcFormat::Bc3 => {
            let mut alphas = [ 0_u8; 16 ];
            for (pixel, alpha) in pixels.iter().zip(alphas.iter_mut()) { *alpha = pixel[3]; }
            encode_alpha_block(&alphas, encoded);
        },

        BcFormat::Bc1 => {},
    }

    let (endpoint0, endpoint1, indices) = fit_color_block(format, quality, pixels);

    encoded.extend_from_slice(&endpoint0.to_le_bytes());
    encoded.extend_from_slice(&endpoint1.to_le_bytes());
    encoded.extend_from_slice(&indices);
}

fn encode_alpha_block(alphas: &[u8; 16], encoded: &mut Vec<u8>) {
    let min = *alphas.iter().min().unwrap_or(&0);
    let max = *alphas.iter().max().unwrap_or(&0);

    // max first selects the seven step interpolation mode
    encoded.push(max);
    encoded.push(min);

    let table = alpha_table(max, min);
    let mut bits = [ 0_u8; 6 ];

    for (pixel, &alpha) in alphas.iter().enumerate() {
        let nearest = table.iter().enumerate()
            .min_by_key(|(_, &value)| (value as i16 - alpha as i16).abs())
            .map(|(index, _)| index).unwrap_or(0) as u8;

        let bit_offset = pixel * 3;
        for bit in 0 .. 3 {
            let position = bit_offset + bit;
            bits[position / 8] |= ((nearest >> bit) & 1) << (position % 8);
        }
    }

    encoded.extend_from_slice(&bits);
}

struct ColorFit {
    endpoint0: u16,
    endpoint1: u16,
    indices: [u8; 16],
    error: f64,
}

fn fit_color_block(format: BcFormat, quality: u8, pixels: &[Pixel; 16]) -> (u16, u16, [u8; 4]) {
    // bc1 stores one bit of alpha through the three color mode
    let transparent: [bool; 16] = std::array::from_fn(|pixel|
        format == BcFormat::Bc1 && pixels[pixel][3] < 128);

    let needs_three_color = transparent.iter().any(|&bit| bit);

    let mut points = [ [0_f32; 3]; 16 ];
    let mut weights = [ 0_f32; 16 ];

    for pixel in 0 .. 16 {
        points[pixel] = [ pixels[pixel][0] as f32, pixels[pixel][1] as f32, pixels[pixel][2] as f32 ];

        weights[pixel] =
            if transparent[pixel] { 0.0 }
            else if quality >= 5 { (pixels[pixel][3] as f32 / 255.0).max(1.0 / 255.0) }
            else { 1.0 };
    }

    let (start, end) = range_fit(&points, &weights);
    let mut best = evaluate(start, end, needs_three_color, format, &points, &weights, &transparent);

    let refinements = match quality {
        0 ..= 2 => 0,
        3 ..= 6 => 1,
        _ => 8,
    };

    for _ in 0 .. refinements {
        match refit_endpoints(&best, format, &points, &weights, &transparent) {
            None => break,

            Some((start, end)) => {
                let candidate = evaluate(start, end, needs_three_color, format, &points, &weights, &transparent);
                if candidate.error < best.error { best = candidate; }
                else { break; }
            },
        }
    }

    let mut index_bytes = [ 0_u8; 4 ];
    for (pixel, &index) in best.indices.iter().enumerate() {
        index_bytes[pixel / 4] |= index << ((pixel % 4) * 2);
    }

    (best.endpoint0, best.endpoint1, index_bytes)
}

/// Project the block onto its principal color axis and
/// take the extreme projections as endpoints.
fn range_fit(points: &[[f32; 3]; 16], weights: &[f32; 16]) -> ([f32; 3], [f32; 3]) {
    let total: f32 = weights.iter().sum();
    if total <= 0.0 { return ([0.0; 3], [0.0; 3]); }

    let mut mean = [ 0_f32; 3 ];
    for (point, &weight) in points.iter().zip(weights) {
        for channel in 0 .. 3 { mean[channel] += point[channel] * weight; }
    }
    for channel in 0 .. 3 { mean[channel] /= total; }

    let axis = principal_axis(points, weights, mean);

    let mut min_projection = f32::MAX;
    let mut max_projection = f32::MIN;

    for (point, &weight) in points.iter().zip(weights) {
        if weight <= 0.0 { continue; }

        let projection = (0 .. 3).map(|channel| (point[channel] - mean[channel]) * axis[channel]).sum();
        min_projection = min_projection.min(projection);
        max_projection = max_projection.max(projection);
    }

    let endpoint = |projection: f32| -> [f32; 3] {
        std::array::from_fn(|channel| mean[channel] + axis[channel] * projection)
    };

    (endpoint(min_projection), endpoint(max_projection))
}

/// Dominant eigenvector of the weighted covariance, by a fixed
/// number of power iterations. Deterministic for identical inputs.
fn principal_axis(points: &[[f32; 3]; 16], weights: &[f32; 16], mean: [f32; 3]) -> [f32; 3] {
    let mut covariance = [ [0_f32; 3]; 3 ];

    for (point, &weight) in points.iter().zip(weights) {
        let centered: [f32; 3] = std::array::from_fn(|channel| point[channel] - mean[channel]);
        for row in 0 .. 3 {
            for column in 0 .. 3 {
                covariance[row][column] += weight * centered[row] * centered[column];
            }
        }
    }

    let mut axis = [ 1.0_f32, 1.0, 1.0 ];

    for _ in 0 .. 8 {
        let multiplied: [f32; 3] = std::array::from_fn(|row|
            (0 .. 3).map(|column| covariance[row][column] * axis[column]).sum());

        let length = multiplied.iter().map(|value| value * value).sum::<f32>().sqrt();
        if length < 1e-8 { return [ 0.577_35, 0.577_35, 0.577_35 ]; }

        axis = std::array::from_fn(|channel| multiplied[channel] / length);
    }

    axis
}

/// Snap the endpoints to RGB565, order them for the required mode,
/// and assign the best index to every pixel.
fn evaluate(
    start: [f32; 3], end: [f32; 3], needs_three_color: bool,
    format: BcFormat, points: &[[f32; 3]; 16], weights: &[f32; 16], transparent: &[bool; 16],
) -> ColorFit
{
    let mut endpoint0 = pack_565(start);
    let mut endpoint1 = pack_565(end);

    if needs_three_color {
        // the decoder reads endpoint0 <= endpoint1 as the three color mode
        if endpoint0 > endpoint1 { std::mem::swap(&mut endpoint0, &mut endpoint1); }
    }
    else if endpoint0 < endpoint1 {
        std::mem::swap(&mut endpoint0, &mut endpoint1);
    }

    let three_color = format == BcFormat::Bc1 && endpoint0 <= endpoint1;
    let colors = block_colors(endpoint0, endpoint1, three_color);
    let selectable = if three_color { 3 } else { 4 };

    let mut indices = [ 0_u8; 16 ];
    let mut error = 0_f64;

    for pixel in 0 .. 16 {
        if transparent[pixel] {
            indices[pixel] = 3;
            continue;
        }

        let mut best_index = 0;
        let mut best_error = f64::MAX;

        for index in 0 .. selectable {
            let mut candidate_error = 0_f64;
            for channel in 0 .. 3 {
                let difference = (colors[index][channel] as f32 - points[pixel][channel]) as f64;
                candidate_error += difference * difference;
            }

            if candidate_error < best_error {
                best_error = candidate_error;
                best_index = index;
            }
        }

        indices[pixel] = best_index as u8;
        error += best_error * weights[pixel] as f64;
    }

    ColorFit { endpoint0, endpoint1, indices, error }
}

/// Weighted least squares solve for the two endpoints,
/// keeping the current index assignment fixed.
fn refit_endpoints(
    fit: &ColorFit, format: BcFormat,
    points: &[[f32; 3]; 16], weights: &[f32; 16], transparent: &[bool; 16],
) -> Option<([f32; 3], [f32; 3])>
{
    let three_color = format == BcFormat::Bc1 && fit.endpoint0 <= fit.endpoint1;

    let interpolation = |index: u8| -> f32 {
        match index {
            0 => 0.0,
            1 => 1.0,
            2 => if three_color { 0.5 } else { 1.0 / 3.0 },
            _ => 2.0 / 3.0,
        }
    };

    let mut sum_aa = 0_f32;
    let mut sum_ab = 0_f32;
    let mut sum_bb = 0_f32;
    let mut sum_ax = [ 0_f32; 3 ];
    let mut sum_bx = [ 0_f32; 3 ];

    for pixel in 0 .. 16 {
        if transparent[pixel] || weights[pixel] <= 0.0 { continue; }

        let t = interpolation(fit.indices[pixel]);
        let a = 1.0 - t;
        let weight = weights[pixel];

        sum_aa += weight * a * a;
        sum_ab += weight * a * t;
        sum_bb += weight * t * t;

        for channel in 0 .. 3 {
            sum_ax[channel] += weight * a * points[pixel][channel];
            sum_bx[channel] += weight * t * points[pixel][channel];
        }
    }

    let determinant = sum_aa * sum_bb - sum_ab * sum_ab;
    if determinant.abs() < 1e-6 { return None; }

    let mut start = [ 0_f32; 3 ];
    let mut end = [ 0_f32; 3 ];

    for channel in 0 .. 3 {
        start[channel] = (sum_bb * sum_ax[channel] - sum_ab * sum_bx[channel]) / determinant;
        end[channel] = (sum_aa * sum_bx[channel] - sum_ab * sum_ax[channel]) / determinant;
    }

    Some((start, end))
}
