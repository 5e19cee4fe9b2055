//! Easing curves. Every curve maps 0 to 0 and 1 to 1.

use std::f32::consts::PI;

pub type Ease = fn(f32) -> f32;

pub fn linear(t: f32) -> f32 {
    t
}

pub fn ease_in_quad(t: f32) -> f32 {
    t * t
}

pub fn ease_in_cubic(t: f32) -> f32 {
    t * t * t
}

pub fn ease_out_cubic(t: f32) -> f32 {
    1.0 - (1.0 - t).powi(3)
}

pub fn ease_in_out_cubic(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

pub fn ease_in_sine(t: f32) -> f32 {
    1.0 - (t * PI / 2.0).cos()
}

pub fn ease_out_sine(t: f32) -> f32 {
    (t * PI / 2.0).sin()
}

pub fn ease_in_out_sine(t: f32) -> f32 {
    -((PI * t).cos() - 1.0) / 2.0
}

/// Overshoots past 1 before settling.
pub fn ease_out_back(t: f32) -> f32 {
    const C1: f32 = 1.70158;
    const C3: f32 = C1 + 1.0;
    1.0 + C3 * (t - 1.0).powi(3) + C1 * (t - 1.0).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_hit_their_endpoints() {
        let curves: [(&str, Ease); 9] = [
            ("linear", linear),
            ("in_quad", ease_in_quad),
            ("in_cubic", ease_in_cubic),
            ("out_cubic", ease_out_cubic),
            ("in_out_cubic", ease_in_out_cubic),
            ("in_sine", ease_in_sine),
            ("out_sine", ease_out_sine),
            ("in_out_sine", ease_in_out_sine),
            ("out_back", ease_out_back),
        ];
        for (name, ease) in curves {
            assert!(ease(0.0).abs() < 1e-6, "{name}(0) = {}", ease(0.0));
            assert!((ease(1.0) - 1.0).abs() < 1e-6, "{name}(1) = {}", ease(1.0));
        }
    }

    #[test]
    fn out_back_overshoots() {
        assert!((0..100).map(|i| ease_out_back(i as f32 / 100.0)).any(|v| v > 1.0));
    }
}
