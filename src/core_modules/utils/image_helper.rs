// Writes samples out as PNG files so a run can be checked by eye.

pub mod image_helper {
    use crate::core_modules::archive::PixelData;
    use crate::core_modules::sample::{ChannelOrder, ImageDims};
    use crate::error::{PrepError, PrepResult};
    use image::ImageEncoder;
    use std::fs;
    use std::path::{Path, PathBuf};

    /// Saves an interleaved RGB buffer as a PNG.
    pub fn save(path: &Path, width: u32, height: u32, rgb: &[u8]) -> PrepResult<()> {
        let output = fs::File::create(path).map_err(|e| PrepError::io(path, e))?;
        let encoder = image::codecs::png::PngEncoder::new(output);
        encoder
            .write_image(rgb, width, height, image::ExtendedColorType::Rgb8)
            .map_err(|source| PrepError::Image {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Converts one stored sample back to displayable RGB bytes.
    fn to_rgb_bytes<T: Copy>(pixels: &[T], order: ChannelOrder, to_u8: impl Fn(T) -> u8) -> Vec<u8> {
        let (ri, gi, bi) = order.rgb_indices();
        let mut out = Vec::with_capacity(pixels.len());
        for px in pixels.chunks_exact(3) {
            out.push(to_u8(px[ri]));
            out.push(to_u8(px[gi]));
            out.push(to_u8(px[bi]));
        }
        out
    }

    /// Writes the first `count` samples of `data` into `dir` as
    /// `<index>_class<id>.png`. Returns the written paths.
    pub fn write_previews(
        dir: &Path,
        data: &PixelData,
        count: usize,
        order: ChannelOrder,
    ) -> PrepResult<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|e| PrepError::io(dir, e))?;
        let mut written = Vec::new();
        let mut emit = |index: usize, class_id: u32, dims: ImageDims, rgb: Vec<u8>| -> PrepResult<()> {
            let path = dir.join(format!("{index:05}_class{class_id:02}.png"));
            save(&path, dims.width, dims.height, &rgb)?;
            written.push(path);
            Ok(())
        };

        match data {
            PixelData::U8(batch) => {
                for (index, (pixels, class_id)) in batch.samples().take(count).enumerate() {
                    emit(index, class_id, batch.dims(), to_rgb_bytes(pixels, order, |v| v))?;
                }
            }
            PixelData::F32(batch) => {
                for (index, (pixels, class_id)) in batch.samples().take(count).enumerate() {
                    let rgb = to_rgb_bytes(pixels, order, |v| (v * 255.0).round().clamp(0.0, 255.0) as u8);
                    emit(index, class_id, batch.dims(), rgb)?;
                }
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::archive::PixelData;
    use crate::core_modules::sample::{ChannelOrder, ImageDims, SampleBatch};

    #[test]
    fn save_white_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("white_file.png");
        let (width, height) = (50u32, 20u32);
        let buffer = vec![255u8; (width * height * 3) as usize];

        save(&path, width, height, &buffer).expect("Error Saving File.");
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (width, height));
    }

    #[test]
    fn previews_restore_rgb_order() {
        let dir = tempfile::tempdir().unwrap();
        let dims = ImageDims::color(1, 1);
        let mut batch = SampleBatch::new(dims);
        // Stored as BGR: pure red.
        batch.push(&[0.0f32, 0.0, 1.0], 14).unwrap();
        batch.push(&[1.0f32, 0.0, 0.0], 3).unwrap();

        let written = write_previews(dir.path(), &PixelData::F32(batch), 1, ChannelOrder::Bgr).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("00000_class14.png"));
        let px = image::open(&written[0]).unwrap().to_rgb8();
        assert_eq!(px.get_pixel(0, 0).0, [255, 0, 0]);
    }
}
