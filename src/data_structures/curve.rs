//! Centripetal Catmull-Rom splines through a list of control points.

use cgmath::{InnerSpace, Vector3};

const ARC_LENGTH_DIVISIONS: usize = 200;

/// Cubic polynomial for one coordinate of one spline segment.
#[derive(Clone, Copy, Debug, Default)]
struct Cubic {
    c0: f32,
    c1: f32,
    c2: f32,
    c3: f32,
}

impl Cubic {
    /// Non-uniform Catmull-Rom segment from `x1` to `x2`, parameterised by the
    /// knot spacings `dt0..dt2`.
    fn nonuniform(x0: f32, x1: f32, x2: f32, x3: f32, dt0: f32, dt1: f32, dt2: f32) -> Self {
        let t1 = ((x1 - x0) / dt0 - (x2 - x0) / (dt0 + dt1) + (x2 - x1) / dt1) * dt1;
        let t2 = ((x2 - x1) / dt1 - (x3 - x1) / (dt1 + dt2) + (x3 - x2) / dt2) * dt1;
        Self {
            c0: x1,
            c1: t1,
            c2: -3.0 * x1 + 3.0 * x2 - 2.0 * t1 - t2,
            c3: 2.0 * x1 - 2.0 * x2 + t1 + t2,
        }
    }

    fn calc(&self, t: f32) -> f32 {
        let t2 = t * t;
        self.c0 + self.c1 * t + self.c2 * t2 + self.c3 * t2 * t
    }
}

/// An open centripetal Catmull-Rom curve.
///
/// `point(t)` walks the spline parameter (equal time per segment), while
/// `point_at(u)` walks arc length, using a cached length table.
#[derive(Clone, Debug)]
pub struct CatmullRom {
    points: Vec<Vector3<f32>>,
    lengths: Vec<f32>,
}

impl CatmullRom {
    pub fn new(points: Vec<Vector3<f32>>) -> Self {
        let mut curve = Self {
            points,
            lengths: Vec::new(),
        };
        curve.lengths = curve.arc_lengths();
        curve
    }

    pub fn points(&self) -> &[Vector3<f32>] {
        &self.points
    }

    pub fn length(&self) -> f32 {
        self.lengths.last().copied().unwrap_or(0.0)
    }

    pub fn point(&self, t: f32) -> Vector3<f32> {
        let l = self.points.len();
        match l {
            0 => return Vector3::new(0.0, 0.0, 0.0),
            1 => return self.points[0],
            _ => {}
        }
        let p = (l - 1) as f32 * t.clamp(0.0, 1.0);
        let mut seg = p.floor() as usize;
        let mut weight = p - seg as f32;
        if seg >= l - 1 {
            seg = l - 2;
            weight = 1.0;
        }

        let p1 = self.points[seg];
        let p2 = self.points[seg + 1];
        let p0 = if seg > 0 {
            self.points[seg - 1]
        } else {
            // extrapolate past the first point
            p1 + (p1 - p2)
        };
        let p3 = if seg + 2 < l {
            self.points[seg + 2]
        } else {
            p2 + (p2 - p1)
        };

        // centripetal: knot spacing is the square root of the chord length
        let mut dt0 = (p1 - p0).magnitude2().powf(0.25);
        let mut dt1 = (p2 - p1).magnitude2().powf(0.25);
        let mut dt2 = (p3 - p2).magnitude2().powf(0.25);
        if dt1 < 1e-4 {
            dt1 = 1.0;
        }
        if dt0 < 1e-4 {
            dt0 = dt1;
        }
        if dt2 < 1e-4 {
            dt2 = dt1;
        }

        let axis = |f: fn(&Vector3<f32>) -> f32| {
            Cubic::nonuniform(f(&p0), f(&p1), f(&p2), f(&p3), dt0, dt1, dt2).calc(weight)
        };
        Vector3::new(axis(|v| v.x), axis(|v| v.y), axis(|v| v.z))
    }

    /// Point at fraction `u` of the curve's arc length.
    pub fn point_at(&self, u: f32) -> Vector3<f32> {
        self.point(self.u_to_t(u.clamp(0.0, 1.0)))
    }

    /// `divisions + 1` evenly spaced parameter samples.
    pub fn sample(&self, divisions: usize) -> Vec<Vector3<f32>> {
        let divisions = divisions.max(1);
        (0..=divisions)
            .map(|d| self.point(d as f32 / divisions as f32))
            .collect()
    }

    fn arc_lengths(&self) -> Vec<f32> {
        let mut lengths = Vec::with_capacity(ARC_LENGTH_DIVISIONS + 1);
        let mut sum = 0.0;
        let mut last = self.point(0.0);
        lengths.push(0.0);
        for p in 1..=ARC_LENGTH_DIVISIONS {
            let current = self.point(p as f32 / ARC_LENGTH_DIVISIONS as f32);
            sum += (current - last).magnitude();
            lengths.push(sum);
            last = current;
        }
        lengths
    }

    fn u_to_t(&self, u: f32) -> f32 {
        let total = self.length();
        if total <= 0.0 {
            return u;
        }
        let target = u * total;
        // last index whose cumulative length does not exceed the target
        let i = self
            .lengths
            .partition_point(|l| *l <= target)
            .saturating_sub(1);
        let last = self.lengths.len() - 1;
        if i >= last {
            return 1.0;
        }
        let before = self.lengths[i];
        let segment = self.lengths[i + 1] - before;
        let fraction = if segment > 0.0 {
            (target - before) / segment
        } else {
            0.0
        };
        (i as f32 + fraction) / last as f32
    }
}
