//! 2D labels pinned to points in the 3D scene.
//!
//! A label lives on the canvas, not in the 3D graph. Each frame the stage
//! calls [`Label::update`], which projects the tracked point through the
//! viewport and adds the pixel offset. Tracking keeps running while the label
//! is popped out, so it pops back in at the right place.

use std::rc::Rc;

use cgmath::{Vector2, Vector3};
use image::Rgba;

use crate::{
    anim::{
        ease::{self, Ease},
        tween::tween_property,
    },
    canvas::Canvas2d,
    nodes::spatial::SpatialNode,
    reactive::{Channel, Property, Signal},
    viewport::Viewport,
};

/// What a label follows.
#[derive(Clone)]
pub enum Tracked {
    Point(Vector3<f32>),
    /// The world position of a node, read every frame.
    Node(SpatialNode),
    Func(Rc<dyn Fn() -> Vector3<f32>>),
}

impl Tracked {
    pub fn world_position(&self) -> Vector3<f32> {
        match self {
            Tracked::Point(p) => *p,
            Tracked::Node(node) => node.global_position(),
            Tracked::Func(f) => f(),
        }
    }
}

/// Colour pairs keyed by the part of the machine a label names. The first
/// entry tints the text, the second fills the box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Palette {
    #[default]
    Sky,
    Bus,
    Alu,
    Fpu,
    Vpu,
    Register,
    Memory,
    Io,
    Decoder,
    Control,
    Cache,
}

const fn rgb(hex: u32) -> Rgba<u8> {
    Rgba([(hex >> 16) as u8, (hex >> 8) as u8, hex as u8, 0xff])
}

impl Palette {
    pub const ALL: [Palette; 11] = [
        Palette::Sky,
        Palette::Bus,
        Palette::Alu,
        Palette::Fpu,
        Palette::Vpu,
        Palette::Register,
        Palette::Memory,
        Palette::Io,
        Palette::Decoder,
        Palette::Control,
        Palette::Cache,
    ];

    /// `(light, dark)`
    pub fn pair(self) -> (Rgba<u8>, Rgba<u8>) {
        let (light, dark) = match self {
            Palette::Sky => (0xD6ECFF, 0x0077C8),
            Palette::Bus => (0xBEEFFF, 0x0077AA),
            Palette::Alu => (0xFFD7B2, 0xFF6A00),
            Palette::Fpu => (0xE5D0FF, 0x4B0082),
            Palette::Vpu => (0xCFFFD0, 0x228B22),
            Palette::Register => (0xC8FACC, 0x006400),
            Palette::Memory => (0xF4D0F4, 0x8B008B),
            Palette::Io => (0xFFEAB6, 0xB8860B),
            Palette::Decoder => (0xD2DCDC, 0x2F4F4F),
            Palette::Control => (0xCCCCCC, 0x444444),
            Palette::Cache => (0xD6D6FF, 0x191970),
        };
        (rgb(light), rgb(dark))
    }

    /// Box fill.
    pub fn fill(self) -> Rgba<u8> {
        self.pair().1
    }

    /// Text colour, also used for the box shadow.
    pub fn text(self) -> Rgba<u8> {
        self.pair().0
    }
}

#[derive(Clone)]
pub struct LabelConfig {
    pub text: String,
    pub tracked: Tracked,
    /// Pixel offset from the projected point.
    pub offset: Vector2<f32>,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
    pub palette: Palette,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            text: String::new(),
            tracked: Tracked::Point(Vector3::new(0.0, 0.0, 0.0)),
            offset: Vector2::new(20.0, -50.0),
            width: 170.0,
            height: 70.0,
            font_size: 60.0,
            palette: Palette::Sky,
        }
    }
}

#[derive(Clone)]
pub struct Label {
    text: Rc<str>,
    tracked: Tracked,
    size: Vector2<f32>,
    font_size: f32,
    palette: Palette,
    position: Property<Vector2<f32>>,
    offset: Property<Vector2<f32>>,
    scale: Property<f32>,
    opacity: Signal<f32>,
}

impl Label {
    pub fn new(config: LabelConfig) -> Self {
        let opacity = Signal::new(0.0);
        let scale = {
            let opacity = opacity.clone();
            Property::new(Channel::Scale, 0.0, move |s: f32| opacity.set(s.clamp(0.0, 1.0)))
        };
        Self {
            text: config.text.into(),
            tracked: config.tracked,
            size: Vector2::new(config.width, config.height),
            font_size: config.font_size,
            palette: config.palette,
            position: Property::detached(Channel::Position, Vector2::new(0.0, 0.0)),
            offset: Property::detached(Channel::Offset, config.offset),
            scale,
            opacity,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    /// Canvas position of the label centre after the last update.
    pub fn position(&self) -> Vector2<f32> {
        self.position.get()
    }

    pub fn offset(&self) -> &Property<Vector2<f32>> {
        &self.offset
    }

    pub fn scale(&self) -> &Property<f32> {
        &self.scale
    }

    pub fn opacity(&self) -> f32 {
        self.opacity.get()
    }

    /// Follow the tracked point for this frame.
    pub fn update(&self, viewport: &Viewport) {
        let screen = viewport.project_to_screen(self.tracked.world_position());
        self.position.set(screen + self.offset.get());
    }

    pub async fn pop_in(&self, duration: f32, ease: Ease) {
        tween_property(&self.scale, 1.0, duration, ease).await
    }

    pub async fn pop_out(&self, duration: f32, ease: Ease) {
        tween_property(&self.scale, 0.0, duration, ease).await
    }

    /// `pop_in` with the usual overshoot.
    pub async fn show(&self) {
        self.pop_in(0.4, ease::ease_out_back).await
    }

    pub async fn hide(&self) {
        self.pop_out(0.3, ease::ease_in_quad).await
    }

    /// Fill the label box, scaled about its centre. Invisible labels draw
    /// nothing.
    pub fn draw(&self, canvas: &mut dyn Canvas2d) {
        let scale = self.scale.get();
        if scale <= 0.0 {
            return;
        }
        let (w, h) = (self.size.x * scale, self.size.y * scale);
        let centre = self.position.get();
        let mut color = self.palette.fill();
        color.0[3] = (color.0[3] as f32 * self.opacity.get()).round() as u8;
        canvas.fill_rect(centre.x - w / 2.0, centre.y - h / 2.0, w, h, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_start_hidden() {
        let label = Label::new(LabelConfig::default());
        assert_eq!(label.scale().get(), 0.0);
        assert_eq!(label.opacity(), 0.0);
    }

    #[test]
    fn opacity_follows_scale_within_bounds() {
        let label = Label::new(LabelConfig::default());
        label.scale().set(1.1);
        assert_eq!(label.opacity(), 1.0);
        label.scale().set(0.5);
        assert_eq!(label.opacity(), 0.5);
    }

    #[test]
    fn function_tracking_is_evaluated_lazily() {
        let value = Rc::new(std::cell::Cell::new(1.0));
        let read = value.clone();
        let tracked = Tracked::Func(Rc::new(move || Vector3::new(read.get(), 0.0, 0.0)));
        value.set(3.0);
        assert_eq!(tracked.world_position().x, 3.0);
    }

    #[test]
    fn sky_fills_with_the_dark_blue() {
        assert_eq!(Palette::default(), Palette::Sky);
        assert_eq!(Palette::Sky.fill(), Rgba([0x00, 0x77, 0xc8, 0xff]));
        assert_eq!(Palette::Sky.text(), Rgba([0xd6, 0xec, 0xff, 0xff]));
    }

    #[test]
    fn every_pair_has_a_lighter_text_colour() {
        let luma = |c: Rgba<u8>| c.0[..3].iter().map(|&v| v as u32).sum::<u32>();
        for palette in Palette::ALL {
            assert!(luma(palette.text()) > luma(palette.fill()), "{palette:?}");
        }
    }
}
