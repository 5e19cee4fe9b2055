use cgmath::{Vector2, Vector3};

use crate::{
    anim::{clock::FrameClock, ease::Ease},
    data_structures::color::Color,
    reactive::Property,
};

/// Linear interpolation between two values of the same type.
pub trait Lerp: Copy {
    fn lerp(self, to: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

impl Lerp for Vector2<f32> {
    fn lerp(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

impl Lerp for Vector3<f32> {
    fn lerp(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

impl Lerp for Color {
    fn lerp(self, to: Self, t: f32) -> Self {
        Color::lerp(self, to, t)
    }
}

/// Call `apply(t)` once per frame with `t` running from 0 to 1 over
/// `duration` seconds of the current frame clock. The last call is always
/// `apply(1.0)`.
pub async fn tween(duration: f32, mut apply: impl FnMut(f32)) {
    let Some(clock) = FrameClock::current() else {
        log::warn!("Tween polled outside of a scheduler, jumping to its end.");
        apply(1.0);
        return;
    };
    if duration <= 0.0 {
        apply(1.0);
        return;
    }
    let start = clock.frame();
    loop {
        let t = (clock.since(start) / duration).clamp(0.0, 1.0);
        apply(t);
        if t >= 1.0 {
            return;
        }
        clock.next_frame().await;
    }
}

/// Interpolate a property from its value at first poll to `to`.
pub async fn tween_property<T: Lerp + 'static>(
    property: &Property<T>,
    to: T,
    duration: f32,
    ease: Ease,
) {
    let from = property.get();
    tween(duration, |t| property.set(from.lerp(to, ease(t)))).await
}
