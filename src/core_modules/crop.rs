// THEORY:
// The `crop` module turns an `Annotation` into a fixed-size pixel block. It is
// the bridge between variable-sized photographs on disk and the dense batch the
// rest of the pipeline works on.
//
// Steps for each annotation:
// 1.  Decode the image (any format the `image` crate reads; the benchmark ships PPM).
// 2.  Cut out the region of interest. Coordinates past the decoded image are
//     clamped, the same way array slicing would treat them.
// 3.  Resize to the configured output size with bilinear filtering. The resample
//     matches OpenCV's `INTER_LINEAR` for 8-bit images: each output pixel blends
//     only its 2x2 nearest source pixels using 11-bit fixed-point weights, and an
//     exact 2x shrink in both directions averages 2x2 blocks instead. There is no
//     anti-aliasing, so crops come out the same as in a cv2-based pipeline.
// 4.  Lay the channels out in the configured order.

use crate::core_modules::annotation::Annotation;
use crate::core_modules::sample::{ChannelOrder, ImageDims, SampleBatch};
use crate::core_modules::workers::WorkerPool;
use crate::error::{PrepError, PrepResult};
use image::imageops;
use tracing::debug;

const COEF_BITS: u32 = 11;
const COEF_SCALE: i32 = 1 << COEF_BITS;

/// Source index and fixed-point weights for each output coordinate along one axis.
/// `weights.1` is zero when the sample sits on or past the last source pixel.
fn linear_taps(src_len: u32, dst_len: u32) -> Vec<(usize, (i32, i32))> {
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len as i64 - 1;
    (0..dst_len)
        .map(|d| {
            let pos = ((d as f64 + 0.5) * scale - 0.5) as f32;
            let floor = pos.floor();
            let mut frac = pos - floor;
            let mut index = floor as i64;
            if index < 0 {
                index = 0;
                frac = 0.0;
            }
            if index >= last {
                index = last;
                frac = 0.0;
            }
            let w0 = ((1.0 - frac) * COEF_SCALE as f32).round_ties_even() as i32;
            let w1 = (frac * COEF_SCALE as f32).round_ties_even() as i32;
            (index as usize, (w0, w1))
        })
        .collect()
}

/// Resizes an interleaved 8-bit image with `INTER_LINEAR` semantics.
pub fn resize_linear(
    src: &[u8],
    src_width: u32,
    src_height: u32,
    channels: u32,
    dst_width: u32,
    dst_height: u32,
) -> Vec<u8> {
    let cn = channels as usize;
    let src_row = src_width as usize * cn;
    let dst_row = dst_width as usize * cn;

    if src_width == 2 * dst_width && src_height == 2 * dst_height {
        let mut out = Vec::with_capacity(dst_row * dst_height as usize);
        for dy in 0..dst_height as usize {
            let top = &src[2 * dy * src_row..(2 * dy + 1) * src_row];
            let bottom = &src[(2 * dy + 1) * src_row..(2 * dy + 2) * src_row];
            for dx in 0..dst_width as usize {
                for c in 0..cn {
                    let left = 2 * dx * cn + c;
                    let sum = top[left] as u32
                        + top[left + cn] as u32
                        + bottom[left] as u32
                        + bottom[left + cn] as u32;
                    out.push(((sum + 2) >> 2) as u8);
                }
            }
        }
        return out;
    }

    let x_taps = linear_taps(src_width, dst_width);
    let y_taps = linear_taps(src_height, dst_height);
    let last_row = src_height as usize - 1;

    // Horizontal pass for one source row, values scaled by `COEF_SCALE`.
    let horizontal = |y: usize| -> Vec<i32> {
        let row = &src[y * src_row..(y + 1) * src_row];
        let mut out = Vec::with_capacity(dst_row);
        for &(sx, (w0, w1)) in &x_taps {
            for c in 0..cn {
                let a = row[sx * cn + c] as i32;
                let b = if w1 == 0 { 0 } else { row[(sx + 1) * cn + c] as i32 };
                out.push(a * w0 + b * w1);
            }
        }
        out
    };

    let mut out = Vec::with_capacity(dst_row * dst_height as usize);
    for &(sy, (w0, w1)) in &y_taps {
        let upper = horizontal(sy);
        let lower = horizontal((sy + 1).min(last_row));
        for (a, b) in upper.iter().zip(&lower) {
            let v = (*a as i64 * w0 as i64 + *b as i64 * w1 as i64 + (1 << (2 * COEF_BITS - 1)))
                >> (2 * COEF_BITS);
            out.push(v.clamp(0, 255) as u8);
        }
    }
    out
}

/// Decodes, crops and resizes one annotated sign.
pub fn load_crop(
    annotation: &Annotation,
    dims: ImageDims,
    order: ChannelOrder,
) -> PrepResult<Vec<u8>> {
    let image = image::open(&annotation.image_path)
        .map_err(|source| PrepError::Image {
            path: annotation.image_path.clone(),
            source,
        })?
        .to_rgb8();

    let (x, y, w, h) = annotation
        .roi
        .clamp_to(image.width(), image.height())
        .ok_or_else(|| PrepError::EmptyRoi {
            path: annotation.image_path.clone(),
            width: image.width(),
            height: image.height(),
        })?;

    let region = imageops::crop_imm(&image, x, y, w, h).to_image();
    let mut pixels = resize_linear(region.as_raw(), w, h, 3, dims.width, dims.height);
    order.arrange_from_rgb(&mut pixels);
    Ok(pixels)
}

/// Crops every annotation into one batch, keeping annotation order.
pub fn crop_all(
    annotations: &[Annotation],
    dims: ImageDims,
    order: ChannelOrder,
    pool: &WorkerPool,
) -> PrepResult<SampleBatch<u8>> {
    let crops = pool.map_ordered(annotations, |a| load_crop(a, dims, order))?;
    let mut batch = SampleBatch::with_capacity(dims, crops.len());
    for (pixels, annotation) in crops.iter().zip(annotations) {
        batch.push(pixels, annotation.class_id)?;
    }
    debug!(samples = batch.len(), workers = pool.workers(), "cropped annotations");
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::annotation::Roi;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn write_quadrants(path: &Path) {
        // Left half red, right half blue.
        let img = RgbImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        img.save(path).unwrap();
    }

    fn annotation(path: &Path, x1: u32, x2: u32) -> Annotation {
        Annotation {
            image_path: path.to_path_buf(),
            roi: Roi {
                x1,
                y1: 0,
                x2,
                y2: 8,
                image_width: 8,
                image_height: 8,
            },
            class_id: 4,
        }
    }

    #[test]
    fn crops_the_requested_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        write_quadrants(&path);

        let pixels = load_crop(&annotation(&path, 0, 4), ImageDims::color(2, 2), ChannelOrder::Rgb).unwrap();
        assert_eq!(pixels.len(), 12);
        for px in pixels.chunks(3) {
            assert_eq!(px, &[255, 0, 0]);
        }
    }

    #[test]
    fn bgr_order_puts_blue_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        write_quadrants(&path);

        let pixels = load_crop(&annotation(&path, 4, 8), ImageDims::color(3, 3), ChannelOrder::Bgr).unwrap();
        for px in pixels.chunks(3) {
            assert_eq!(px, &[255, 0, 0]);
        }
    }

    #[test]
    fn out_of_bounds_roi_is_clamped_then_rejected_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        write_quadrants(&path);

        let clamped = load_crop(&annotation(&path, 4, 50), ImageDims::color(2, 2), ChannelOrder::Rgb);
        assert!(clamped.is_ok());

        let empty = load_crop(&annotation(&path, 20, 30), ImageDims::color(2, 2), ChannelOrder::Rgb);
        assert!(matches!(empty, Err(PrepError::EmptyRoi { .. })));
    }

    #[test]
    fn missing_image_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.png");
        match load_crop(&annotation(&path, 0, 4), ImageDims::color(2, 2), ChannelOrder::Rgb) {
            Err(PrepError::Image { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected image error, got {other:?}"),
        }
    }

    #[test]
    fn linear_resize_matches_opencv_values() {
        // cv2.resize(np.uint8([[0, 100, 200, 250]]), (2, 1)) == [[50, 225]]
        assert_eq!(resize_linear(&[0, 100, 200, 250], 4, 1, 1, 2, 1), vec![50, 225]);
        // cv2.resize(np.uint8([[0, 200]]), (4, 1)) == [[0, 50, 150, 200]]
        assert_eq!(resize_linear(&[0, 200], 2, 1, 1, 4, 1), vec![0, 50, 150, 200]);
    }

    #[test]
    fn linear_shrink_does_not_smooth_over_skipped_columns() {
        // Every fourth column white. A 4x shrink samples columns 4d+1 and 4d+2,
        // which are all black.
        let img = RgbImage::from_fn(16, 4, |x, _| {
            if x % 4 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let out = resize_linear(img.as_raw(), 16, 4, 3, 4, 1);
        assert_eq!(out, vec![0u8; 12]);
    }

    #[test]
    fn exact_half_size_averages_blocks() {
        // 4x2 single channel -> 2x1; (1+2+3+4+2)>>2 = 3, (10+10+20+21+2)>>2 = 15
        let src = [1, 2, 10, 10, 3, 4, 20, 21];
        assert_eq!(resize_linear(&src, 4, 2, 1, 2, 1), vec![3, 15]);
    }

    #[test]
    fn same_size_is_identity() {
        let src: Vec<u8> = (0..27).map(|v| v * 9).collect();
        assert_eq!(resize_linear(&src, 3, 3, 3, 3, 3), src);
    }

    #[test]
    fn crop_all_keeps_order_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        write_quadrants(&path);
        let mut left = annotation(&path, 0, 4);
        left.class_id = 1;
        let mut right = annotation(&path, 4, 8);
        right.class_id = 2;

        let pool = WorkerPool::new(Some(2)).unwrap();
        let batch = crop_all(&[left, right], ImageDims::color(2, 2), ChannelOrder::Rgb, &pool).unwrap();
        assert_eq!(batch.class_ids(), &[1, 2]);
        assert_eq!(&batch.sample(0).unwrap()[..3], &[255, 0, 0]);
        assert_eq!(&batch.sample(1).unwrap()[..3], &[0, 0, 255]);
    }
}
