use std::path::Path;

use anyhow::Context;
use image::{ImageFormat, Rgba32FImage};

use crate::data_structures::{color::srgb_to_linear, texture::HdrImage};

#[cfg(target_arch = "wasm32")]
fn format_url(root: &Path, file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().context("No window to resolve asset URLs against")?;
    let origin = window
        .location()
        .origin()
        .map_err(|e| anyhow::anyhow!("Could not read the page origin: {:?}", e))?;
    let base = reqwest::Url::parse(&format!("{}/{}/", origin, root.display()))?;
    Ok(base.join(file_name)?)
}

/// Read an asset below `root`: a directory natively, a path below the page
/// origin on the web.
pub async fn load_binary(root: &Path, file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(root, file_name)?;
        reqwest::get(url).await?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = root.join(file_name);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Could not read {}", path.display()))?
    };

    Ok(data)
}

pub async fn load_string(root: &Path, file_name: &str) -> anyhow::Result<String> {
    let data = load_binary(root, file_name).await?;
    String::from_utf8(data).with_context(|| format!("{file_name} is not valid UTF-8"))
}

/// Decode an equirectangular image into linear radiance. Radiance HDR and
/// OpenEXR are linear already; 8-bit formats are treated as sRGB.
pub fn decode_equirect(bytes: &[u8], file_name: &str) -> anyhow::Result<HdrImage> {
    let format = image::guess_format(bytes)
        .with_context(|| format!("Unknown image format for {file_name}"))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .with_context(|| format!("Could not decode {file_name}"))?;
    let mut pixels: Rgba32FImage = decoded.to_rgba32f();
    if !matches!(format, ImageFormat::Hdr | ImageFormat::OpenExr) {
        for pixel in pixels.pixels_mut() {
            for c in &mut pixel.0[..3] {
                *c = srgb_to_linear(*c);
            }
        }
    }
    log::debug!(
        "Decoded {} ({:?}, {}x{})",
        file_name,
        format,
        pixels.width(),
        pixels.height()
    );
    Ok(HdrImage::new(pixels))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{Rgba, RgbaImage};

    use super::*;

    #[test]
    fn png_sources_are_linearised() {
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(2, 1, Rgba([128, 128, 128, 255]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        let image = decode_equirect(&bytes, "grey.png").expect("decode png");
        let value = image.pixels.get_pixel(0, 0).0[0];
        assert!((value - 0.2158).abs() < 1e-3, "{value}");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_equirect(b"not an image", "broken.hdr").is_err());
    }
}
