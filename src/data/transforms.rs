use burn::prelude::*;
use image::{DynamicImage, RgbImage};

/// How a letterboxed image maps back to its source: scale applied and the
/// padding offsets of the pasted region.
#[derive(Debug, Clone, Copy)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Map a point in network-input pixels back to source-image pixels.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Resize with aspect ratio kept, pasted centered on a gray canvas.
pub fn letterbox(img: &RgbImage, target_size: u32) -> (RgbImage, Letterbox) {
    let (w, h) = img.dimensions();
    let scale = (target_size as f32 / w.max(h) as f32).min(1.0);

    let new_w = ((w as f32 * scale) as u32).max(1);
    let new_h = ((h as f32 * scale) as u32).max(1);

    let resized = image::imageops::resize(img, new_w, new_h, image::imageops::FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(target_size, target_size, image::Rgb([114, 114, 114]));
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;
    image::imageops::overlay(&mut canvas, &resized, pad_x.into(), pad_y.into());

    (
        canvas,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

/// Letterbox and convert to a [1, 3, S, S] CHW tensor normalized to [0, 1].
pub fn image_to_input<B: Backend>(
    img: &DynamicImage,
    target_size: u32,
    device: &B::Device,
) -> (Tensor<B, 4>, Letterbox) {
    let rgb = img.to_rgb8();
    let (canvas, letterbox) = letterbox(&rgb, target_size);

    let size = target_size as usize;
    let pixels = size * size;
    let mut data = vec![0.0f32; pixels * 3];
    for (idx, pixel) in canvas.pixels().enumerate() {
        data[idx] = pixel[0] as f32 / 255.0;
        data[pixels + idx] = pixel[1] as f32 / 255.0;
        data[2 * pixels + idx] = pixel[2] as f32 / 255.0;
    }

    let tensor = Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([1, 3, size, size]);
    (tensor, letterbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn letterbox_centers_wide_images() {
        let img = RgbImage::from_pixel(100, 50, image::Rgb([255, 0, 0]));
        let (canvas, info) = letterbox(&img, 64);
        assert_eq!(canvas.dimensions(), (64, 64));
        assert_eq!(info.pad_x, 0);
        assert_eq!(info.pad_y, 16);
        assert!((info.scale - 0.64).abs() < 1e-6);
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let img = RgbImage::from_pixel(10, 10, image::Rgb([0, 255, 0]));
        let (_, info) = letterbox(&img, 64);
        assert_eq!(info.scale, 1.0);
        assert_eq!(info.pad_x, 27);
    }

    #[test]
    fn tensor_layout_is_chw_normalized() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([255, 0, 0])));
        let device = NdArrayDevice::default();
        let (tensor, _) = image_to_input::<NdArray>(&img, 8, &device);
        assert_eq!(tensor.dims(), [1, 3, 8, 8]);

        let data: Vec<f32> = tensor.into_data().convert::<f32>().to_vec().unwrap();
        // Red channel saturated, green and blue empty.
        assert!((data[0] - 1.0).abs() < 1e-6);
        assert_eq!(data[64], 0.0);
        assert_eq!(data[128], 0.0);
    }

    #[test]
    fn letterbox_maps_points_back_to_source() {
        let info = Letterbox {
            scale: 0.5,
            pad_x: 0,
            pad_y: 16,
        };
        let (x, y) = info.to_source(32.0, 48.0);
        assert_eq!(x, 64.0);
        assert_eq!(y, 64.0);
    }
}
