//! The 2D surface a viewport composites into.
//!
//! Coordinates are centre-origin: `(0, 0)` is the middle of the canvas, x grows
//! right and y grows down. A viewport covering the whole canvas is drawn at
//! `(-w / 2, -h / 2)` with size `w × h`.

use image::{Rgba, RgbaImage, imageops};

pub trait Canvas2d {
    fn size(&self) -> (u32, u32);

    fn clear(&mut self, color: Rgba<u8>);

    /// Draw `image` scaled to `width × height` with its top-left corner at
    /// `(x, y)`, alpha-blended over what is already there.
    fn draw_image(&mut self, image: &RgbaImage, x: f32, y: f32, width: f32, height: f32);

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba<u8>);
}

/// A canvas backed by an in-memory RGBA image.
#[derive(Clone, Debug)]
pub struct ImageCanvas {
    image: RgbaImage,
}

impl ImageCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Canvas space to pixel space.
    fn to_pixels(&self, x: f32, y: f32) -> (i64, i64) {
        let (w, h) = (self.image.width() as f32, self.image.height() as f32);
        ((x + w / 2.0).round() as i64, (y + h / 2.0).round() as i64)
    }
}

impl Canvas2d for ImageCanvas {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn clear(&mut self, color: Rgba<u8>) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }

    fn draw_image(&mut self, image: &RgbaImage, x: f32, y: f32, width: f32, height: f32) {
        let (w, h) = (width.round().max(0.0) as u32, height.round().max(0.0) as u32);
        if w == 0 || h == 0 {
            return;
        }
        let (px, py) = self.to_pixels(x, y);
        if image.dimensions() == (w, h) {
            imageops::overlay(&mut self.image, image, px, py);
        } else {
            let scaled = imageops::resize(image, w, h, imageops::FilterType::Triangle);
            imageops::overlay(&mut self.image, &scaled, px, py);
        }
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba<u8>) {
        let (w, h) = (width.round().max(0.0) as u32, height.round().max(0.0) as u32);
        if w == 0 || h == 0 || color.0[3] == 0 {
            return;
        }
        let rect = RgbaImage::from_pixel(w, h, color);
        let (px, py) = self.to_pixels(x, y);
        imageops::overlay(&mut self.image, &rect, px, py);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_canvas_image_lands_on_every_pixel() {
        let mut canvas = ImageCanvas::new(8, 6);
        let red = RgbaImage::from_pixel(8, 6, Rgba([255, 0, 0, 255]));
        canvas.draw_image(&red, -4.0, -3.0, 8.0, 6.0);
        assert!(canvas.image().pixels().all(|p| *p == Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn rects_are_centre_origin_and_clipped() {
        let mut canvas = ImageCanvas::new(10, 10);
        canvas.clear(Rgba([0, 0, 0, 255]));
        canvas.fill_rect(0.0, 0.0, 20.0, 20.0, Rgba([0, 255, 0, 255]));
        assert_eq!(*canvas.image().get_pixel(4, 4), Rgba([0, 0, 0, 255]));
        assert_eq!(*canvas.image().get_pixel(5, 5), Rgba([0, 255, 0, 255]));
        assert_eq!(*canvas.image().get_pixel(9, 9), Rgba([0, 255, 0, 255]));
    }
}
