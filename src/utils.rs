use std::path::Path;

use anyhow::Result;
use candle_core::{Device, Tensor};
use chrono::{DateTime, TimeZone};
use image::{imageops::FilterType, ImageBuffer, RgbImage};

use crate::Error;

/// Edge length of the on-screen preview.
pub const PREVIEW_SIZE: u32 = 512;

/// Converts a u8 tensor with shape (c, height, width) into an RGB image.
pub fn tensor_to_image(img: &Tensor) -> Result<RgbImage> {
    let (channel, height, width) = img.dims3()?;
    if channel != 3 {
        return Err(Error::InvalidImageShape(img.dims().to_vec()).into());
    }
    let img = img.permute((1, 2, 0))?.flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    match ImageBuffer::from_raw(width as u32, height as u32, pixels) {
        Some(image) => Ok(image),
        None => Err(Error::InvalidImageShape(vec![channel, height, width]).into()),
    }
}

pub fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else {
        let device = Device::cuda_if_available(0)?;
        if !device.is_cuda() {
            tracing::warn!(
                "Running on CPU, to run on GPU, build with `--features cuda`"
            );
        }
        Ok(device)
    }
}

pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA",
        Device::Metal(_) => "METAL",
    }
}

/// `<prefix>_<YYYYMMDD_HHMMSS>.png` for the given instant.
pub fn output_filename<Tz: TimeZone>(prefix: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{prefix}_{}.png", at.format("%Y%m%d_%H%M%S"))
}

/// Bare file name of `path` for status messages.
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Fixed-size copy of `image` for display.
pub fn preview(image: &RgbImage) -> RgbImage {
    image::imageops::resize(image, PREVIEW_SIZE, PREVIEW_SIZE, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use chrono::Utc;

    #[test]
    fn filename_uses_second_resolution_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(output_filename("generated", &at), "generated_20240307_090502.png");
        assert_eq!(output_filename("saved", &at), "saved_20240307_090502.png");
    }

    #[test]
    fn tensor_becomes_rgb_pixels() {
        // channel-major: r plane, g plane, b plane for a 1x2 image
        let data: Vec<u8> = vec![10, 11, 20, 21, 30, 31];
        let tensor = Tensor::from_vec(data, (3, 1, 2), &Device::Cpu).unwrap();
        let image = tensor_to_image(&tensor).unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(image.get_pixel(1, 0).0, [11, 21, 31]);
    }

    #[test]
    fn tensor_with_alpha_is_rejected() {
        let tensor = Tensor::zeros((4, 2, 2), DType::U8, &Device::Cpu).unwrap();
        let err = tensor_to_image(&tensor).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidImageShape(dims)) if dims == &vec![4, 2, 2]
        ));
    }

    #[test]
    fn preview_is_fixed_size() {
        let image = RgbImage::from_pixel(64, 32, image::Rgb([1, 2, 3]));
        let preview = preview(&image);
        assert_eq!(preview.dimensions(), (PREVIEW_SIZE, PREVIEW_SIZE));
    }

    #[test]
    fn cpu_device_when_requested() {
        let device = device(true).unwrap();
        assert_eq!(device_label(&device), "CPU");
    }
}
