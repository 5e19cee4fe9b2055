//! Polylines and splines through control points.
//!
//! A straight line draws its control points as they are. A smooth line draws a
//! centripetal Catmull-Rom spline sampled at `max(4, 12 · n)` steps. The
//! curve is also what [`Line::get_point_at`] and the flow markers travel
//! along; for straight lines it is built lazily on first use.

use std::{cell::RefCell, rc::Rc};

use cgmath::Vector3;

use crate::{
    anim::{
        compose::sequence,
        ease::{self, Ease},
        tween::{Lerp, tween, tween_property},
    },
    data_structures::{
        color::Color,
        curve::CatmullRom,
        geometry::Geometry,
        material::Material,
        scene_graph::Object3d,
    },
    nodes::{
        mesh::{Mesh, MeshConfig},
        spatial::{Node3d, SpatialNode, Transform},
    },
    reactive::{Channel, Property},
};

const MARKER_RADIUS: f32 = 0.002;
const MARKER_RENDER_ORDER: i32 = 999;

#[derive(Clone, Debug)]
pub struct LineConfig {
    pub transform: Transform,
    pub points: Vec<Vector3<f32>>,
    pub smooth: bool,
    pub color: Color,
    pub line_width: f32,
    pub dashed: bool,
    pub alpha: f32,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            points: Vec::new(),
            smooth: false,
            color: Color::WHITE,
            line_width: 4.0,
            dashed: false,
            alpha: 1.0,
        }
    }
}

/// Which way flow markers travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlowDirection {
    Forward,
    Reverse,
}

#[derive(Clone)]
pub struct Line {
    mesh: Mesh,
    points: Rc<RefCell<Vec<Vector3<f32>>>>,
    curve: Rc<RefCell<Option<CatmullRom>>>,
    smooth: bool,
    color: Property<Color>,
    width: Property<f32>,
}

impl Line {
    pub fn new(config: LineConfig) -> Self {
        let curve = Rc::new(RefCell::new(None));
        let geometry = build_geometry(&config.points, config.smooth, &curve);
        let mesh = Mesh::new(MeshConfig {
            transform: config.transform,
            geometry: Some(Rc::new(geometry)),
            material: Some(Material::line(config.color, config.line_width, config.dashed)),
            alpha: config.alpha,
            ..Default::default()
        });

        let color = {
            let mesh = mesh.clone();
            Property::new(Channel::Color, config.color, move |c| {
                mesh.with_material_mut(|m| m.color = c);
            })
        };
        let width = {
            let mesh = mesh.clone();
            Property::new(Channel::Width, config.line_width, move |w| {
                mesh.with_material_mut(|m| m.set_line_width(w));
            })
        };

        Self {
            mesh,
            points: Rc::new(RefCell::new(config.points)),
            curve,
            smooth: config.smooth,
            color,
            width,
        }
    }

    pub fn points(&self) -> Vec<Vector3<f32>> {
        self.points.borrow().clone()
    }

    pub fn is_smooth(&self) -> bool {
        self.smooth
    }

    pub fn color(&self) -> &Property<Color> {
        &self.color
    }

    pub fn width(&self) -> &Property<f32> {
        &self.width
    }

    /// Number of vertices currently drawn.
    pub fn vertex_count(&self) -> usize {
        self.mesh
            .content()
            .and_then(|content| content.geometry())
            .map_or(0, |geometry| geometry.vertex_count())
    }

    fn with_curve<R>(&self, f: impl FnOnce(&CatmullRom) -> R) -> R {
        let mut curve = self.curve.borrow_mut();
        let curve = curve.get_or_insert_with(|| CatmullRom::new(self.points.borrow().clone()));
        f(curve)
    }

    /// Point on the curve at spline parameter `t`, clamped to [0, 1].
    pub fn get_point_at(&self, t: f32) -> Vector3<f32> {
        self.with_curve(|curve| curve.point(t.clamp(0.0, 1.0)))
    }

    pub fn middle_point(&self) -> Vector3<f32> {
        self.get_point_at(0.5)
    }

    fn rebuild(&self, points: &[Vector3<f32>]) {
        let geometry = build_geometry(points, self.smooth, &self.curve);
        if let Some(content) = self.mesh.content() {
            content.set_geometry(Rc::new(geometry));
        }
    }

    /// Morph the control points into `target`. Points past the shorter of the
    /// two lists appear at their final position straight away.
    pub async fn update_points(&self, target: Vec<Vector3<f32>>, duration: f32, ease: Ease) {
        let from = self.points();
        if from.len() != target.len() {
            log::warn!(
                "Line morph from {} to {} control points, the animation may look uneven.",
                from.len(),
                target.len()
            );
        }
        let shared = from.len().min(target.len());
        tween(duration, |t| {
            let k = ease(t);
            let mut points: Vec<Vector3<f32>> = from
                .iter()
                .zip(&target)
                .map(|(a, b)| a.lerp(*b, k))
                .collect();
            points.extend_from_slice(&target[shared..]);
            self.rebuild(&points);
        })
        .await;
        *self.points.borrow_mut() = target;
        if !self.smooth {
            self.curve.replace(None);
        }
    }

    pub async fn color_to(&self, color: Color, duration: f32, ease: Ease) {
        tween_property(&self.color, color, duration, ease).await
    }

    pub async fn width_to(&self, width: f32, duration: f32, ease: Ease) {
        tween_property(&self.width, width, duration, ease).await
    }

    /// Thicken and brighten, or thin and darken when `enable` is false.
    pub async fn highlight(&self, enable: bool, duration: f32, ease: Ease) {
        let (width, color) = (self.width.get(), self.color.get());
        let (width, color) = if enable {
            (width * 1.2, color.lerp(Color::WHITE, 0.2))
        } else {
            (width / 1.2, color.lerp(Color::BLACK, 0.2))
        };
        futures::join!(
            self.width_to(width, duration, ease),
            self.color_to(color, duration, ease),
        );
    }

    pub async fn pulse(&self, duration: f32) {
        let (width, color) = (self.width.get(), self.color.get());
        let half = duration / 2.0;
        futures::join!(
            self.color_to(color.lerp(Color::WHITE, 0.4), half, ease::ease_out_back),
            self.width_to(width * 1.2, half, ease::ease_out_back),
        );
        futures::join!(
            self.color_to(color, half, ease::ease_in_out_sine),
            self.width_to(width, half, ease::ease_in_out_sine),
        );
    }

    /// Dim to 40 % of the current colour when switched off.
    pub async fn toggle(&self, on: bool, duration: f32, ease: Ease) {
        let target = self.color.get().scale(if on { 1.0 } else { 0.4 });
        self.color_to(target, duration, ease).await
    }

    /// Send `⌊duration · density⌋` markers from start to end.
    pub async fn current_flow(&self, duration: f32, ease: Ease, density: f32) {
        self.flow(duration, ease, density, FlowDirection::Forward).await
    }

    pub async fn reverse_flow(&self, duration: f32, ease: Ease, density: f32) {
        self.flow(duration, ease, density, FlowDirection::Reverse).await
    }

    async fn flow(&self, duration: f32, ease: Ease, density: f32, direction: FlowDirection) {
        let amount = (duration * density).floor() as usize;
        if amount == 0 {
            log::debug!("Flow of {duration}s at density {density} has no markers.");
            return;
        }
        let curve = self.with_curve(CatmullRom::clone);
        let sphere = Rc::new(Geometry::sphere(MARKER_RADIUS, 16, 16));
        let core = self.mesh.spatial().core().clone();

        let markers = (0..amount).map(|_| {
            let (curve, sphere, core) = (&curve, sphere.clone(), core.clone());
            async move {
                let mut material = Material::basic(Color::WHITE);
                material.depth_test = false;
                let marker = Object3d::mesh(sphere, material).named("flow marker");
                marker.data_mut().render_order = MARKER_RENDER_ORDER;
                core.add(&marker);
                tween(duration, |t| {
                    let t = ease(t).clamp(0.0, 1.0);
                    let u = match direction {
                        FlowDirection::Forward => t,
                        FlowDirection::Reverse => 1.0 - t,
                    };
                    marker.set_position(curve.point_at(u));
                    // fade over the first and last fifth of the trip
                    let (travelled, remaining) = match direction {
                        FlowDirection::Forward => (u, 1.0 - u),
                        FlowDirection::Reverse => (1.0 - u, u),
                    };
                    let opacity = ease::ease_out_cubic((travelled * 5.0).min(1.0))
                        .min(ease::ease_in_cubic((remaining * 5.0).min(1.0)));
                    marker.with_material_mut(|m| m.set_opacity(opacity));
                })
                .await;
                core.remove(&marker);
            }
        });
        sequence(duration / amount as f32, markers).await;
    }
}

fn build_geometry(
    points: &[Vector3<f32>],
    smooth: bool,
    curve: &RefCell<Option<CatmullRom>>,
) -> Geometry {
    if !smooth {
        return Geometry::line_strip(points);
    }
    let spline = CatmullRom::new(points.to_vec());
    let steps = (points.len() * 12).max(4);
    let samples = spline.sample(steps);
    curve.replace(Some(spline));
    Geometry::line_strip(&samples)
}

impl Node3d for Line {
    fn spatial(&self) -> &SpatialNode {
        self.mesh.spatial()
    }
}

impl std::ops::Deref for Line {
    type Target = Mesh;

    fn deref(&self) -> &Mesh {
        &self.mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_points(smooth: bool) -> Line {
        Line::new(LineConfig {
            points: vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)],
            smooth,
            ..Default::default()
        })
    }

    #[test]
    fn straight_lines_draw_their_points() {
        assert_eq!(two_points(false).vertex_count(), 2);
    }

    #[test]
    fn smooth_lines_sample_the_spline() {
        assert_eq!(two_points(true).vertex_count(), 25);
    }

    #[test]
    fn point_lookup_clamps_and_builds_the_curve_lazily() {
        let line = two_points(false);
        assert_eq!(line.get_point_at(-1.0), Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(line.get_point_at(2.0), Vector3::new(1.0, 0.0, 0.0));
        assert!((line.middle_point().x - 0.5).abs() < 1e-4);
    }

    #[test]
    fn width_and_colour_write_through_to_the_material() {
        let line = two_points(false);
        line.width().set(8.0);
        line.color().set(Color::BLACK);
        let material = line.material().expect("line has content");
        assert_eq!(material.line_width(), Some(8.0));
        assert_eq!(material.color, Color::BLACK);
    }
}
