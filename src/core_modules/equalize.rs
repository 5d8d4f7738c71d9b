// THEORY:
// The `equalize` module normalizes contrast across the training set. Traffic-sign
// photographs range from near-black dusk shots to washed-out glare; equalizing the
// luma histogram of each crop spreads its brightness over the full range without
// shifting hue.
//
// Per sample:
// 1.  Convert to YCrCb with the fixed-point BT.601 coefficients used by the common
//     8-bit vision toolkits, so results match crops prepared elsewhere bit for bit.
// 2.  Equalize the Y plane through a cumulative-histogram lookup table.
// 3.  Convert back to the sample's channel order.
// 4.  Scale every value to `f32` in `[0, 1]`.

use crate::core_modules::sample::{ChannelOrder, SampleBatch};
use crate::core_modules::workers::WorkerPool;
use crate::error::PrepResult;

const SHIFT: i32 = 14;
const HALF: i32 = 1 << (SHIFT - 1);
const DELTA: i32 = 128 << SHIFT;

// RGB -> YCrCb
const R2Y: i32 = 4899;
const G2Y: i32 = 9617;
const B2Y: i32 = 1868;
const CR_SCALE: i32 = 11682;
const CB_SCALE: i32 = 9241;

// YCrCb -> RGB
const CR2R: i32 = 22987;
const CR2G: i32 = -11698;
const CB2G: i32 = -5636;
const CB2B: i32 = 29049;

#[inline]
fn descale(value: i32) -> i32 {
    (value + HALF) >> SHIFT
}

#[inline]
fn saturate(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Converts one RGB pixel to `(Y, Cr, Cb)`.
pub fn rgb_to_ycrcb(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = descale(r * R2Y + g * G2Y + b * B2Y);
    let cr = descale((r - y) * CR_SCALE + DELTA);
    let cb = descale((b - y) * CB_SCALE + DELTA);
    (saturate(y), saturate(cr), saturate(cb))
}

/// Converts one `(Y, Cr, Cb)` pixel back to RGB.
pub fn ycrcb_to_rgb(y: u8, cr: u8, cb: u8) -> (u8, u8, u8) {
    let y = y as i32;
    let cr = cr as i32 - 128;
    let cb = cb as i32 - 128;
    let r = y + descale(cr * CR2R);
    let g = y + descale(cb * CB2G + cr * CR2G);
    let b = y + descale(cb * CB2B);
    (saturate(r), saturate(g), saturate(b))
}

/// Builds the equalization lookup table for a single-channel plane.
pub fn equalization_lut(plane: &[u8]) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for &v in plane {
        hist[v as usize] += 1;
    }

    let mut lut = [0u8; 256];
    let total = plane.len() as u32;
    let Some(first) = hist.iter().position(|&count| count > 0) else {
        return lut;
    };
    // A flat plane maps onto itself.
    if hist[first] == total {
        return [first as u8; 256];
    }

    let scale = 255.0f32 / (total - hist[first]) as f32;
    let mut sum = 0u32;
    for i in (first + 1)..256 {
        sum += hist[i];
        lut[i] = (sum as f32 * scale).round_ties_even().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Equalizes a single-channel plane in place.
pub fn equalize_plane(plane: &mut [u8]) {
    let lut = equalization_lut(plane);
    for v in plane.iter_mut() {
        *v = lut[*v as usize];
    }
}

/// Equalizes the luma of one interleaved 3-channel sample and scales it to `[0, 1]`.
pub fn equalize_sample(pixels: &[u8], order: ChannelOrder) -> Vec<f32> {
    let (ri, gi, bi) = order.rgb_indices();
    let n = pixels.len() / 3;
    let mut luma = Vec::with_capacity(n);
    let mut chroma = Vec::with_capacity(n);
    for px in pixels.chunks_exact(3) {
        let (y, cr, cb) = rgb_to_ycrcb(px[ri], px[gi], px[bi]);
        luma.push(y);
        chroma.push((cr, cb));
    }

    equalize_plane(&mut luma);

    let mut out = vec![0.0f32; pixels.len()];
    for (i, (y, (cr, cb))) in luma.into_iter().zip(chroma).enumerate() {
        let (r, g, b) = ycrcb_to_rgb(y, cr, cb);
        let px = &mut out[i * 3..i * 3 + 3];
        px[ri] = r as f32 / 255.0;
        px[gi] = g as f32 / 255.0;
        px[bi] = b as f32 / 255.0;
    }
    out
}

/// Runs `equalize_sample` over a whole batch. Class ids are carried through untouched.
pub fn equalize_batch(
    batch: &SampleBatch<u8>,
    order: ChannelOrder,
    pool: &WorkerPool,
) -> PrepResult<SampleBatch<f32>> {
    let indices: Vec<usize> = (0..batch.len()).collect();
    let equalized = pool.map_ordered(&indices, |&i| {
        Ok(batch
            .sample(i)
            .map(|pixels| equalize_sample(pixels, order))
            .unwrap_or_default())
    })?;
    let mut out = SampleBatch::with_capacity(batch.dims(), batch.len());
    for (pixels, &class_id) in equalized.iter().zip(batch.class_ids()) {
        out.push(pixels, class_id)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::sample::ImageDims;

    #[test]
    fn gray_pixels_have_neutral_chroma() {
        for v in [0u8, 17, 128, 200, 255] {
            assert_eq!(rgb_to_ycrcb(v, v, v), (v, 128, 128));
            assert_eq!(ycrcb_to_rgb(v, 128, 128), (v, v, v));
        }
    }

    #[test]
    fn primaries_match_reference_values() {
        assert_eq!(rgb_to_ycrcb(255, 0, 0), (76, 255, 85));
        assert_eq!(rgb_to_ycrcb(0, 0, 255), (29, 107, 255));
    }

    #[test]
    fn color_round_trip_stays_close() {
        for &(r, g, b) in &[(200u8, 30u8, 40u8), (12, 180, 90), (90, 90, 250)] {
            let (y, cr, cb) = rgb_to_ycrcb(r, g, b);
            let (r2, g2, b2) = ycrcb_to_rgb(y, cr, cb);
            assert!((r as i32 - r2 as i32).abs() <= 2, "{r} vs {r2}");
            assert!((g as i32 - g2 as i32).abs() <= 2, "{g} vs {g2}");
            assert!((b as i32 - b2 as i32).abs() <= 2, "{b} vs {b2}");
        }
    }

    #[test]
    fn lut_stretches_to_full_range() {
        let mut plane = vec![100u8, 100, 110, 120];
        equalize_plane(&mut plane);
        assert_eq!(plane, vec![0, 0, 128, 255]);
    }

    #[test]
    fn flat_plane_is_unchanged() {
        let mut plane = vec![42u8; 16];
        equalize_plane(&mut plane);
        assert!(plane.iter().all(|&v| v == 42));
    }

    #[test]
    fn equalized_sample_is_unit_scaled() {
        let pixels: Vec<u8> = (0..48u32).map(|v| (v * 3) as u8).collect();
        let out = equalize_sample(&pixels, ChannelOrder::Bgr);
        assert_eq!(out.len(), pixels.len());
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
        let max = out.iter().cloned().fold(0.0f32, f32::max);
        assert!(max > 0.9);
    }

    #[test]
    fn batch_keeps_labels() {
        let mut batch = SampleBatch::new(ImageDims::color(2, 1));
        batch.push(&[10, 10, 10, 200, 200, 200], 9).unwrap();
        batch.push(&[0, 0, 0, 0, 0, 0], 2).unwrap();
        let pool = WorkerPool::new(Some(1)).unwrap();
        let out = equalize_batch(&batch, ChannelOrder::Rgb, &pool).unwrap();
        assert_eq!(out.class_ids(), &[9, 2]);
        assert_eq!(out.sample(0).unwrap(), &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(out.sample(1).unwrap(), &[0.0; 6]);
    }
}
