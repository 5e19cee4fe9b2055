//! Lights and the default studio rig.
//!
//! One [`Light`] type covers every kind of light; the kind only decides which
//! fields the renderer reads and whether the light can be aimed. Like cameras,
//! a light keeps an identity core and its transform channels move the light
//! object beneath it. Directional and spot lights also own a target object,
//! placed next to the light under the same core, which `look_to` moves.

use std::{cell::RefCell, rc::Rc};

use cgmath::Vector3;

use crate::{
    anim::{
        ease::Ease,
        tween::tween_property,
    },
    config::PostProcessConfig,
    data_structures::{
        color::Color,
        scene_graph::{LightData, LightKind, Object3d, ObjectKind, ShadowSettings},
    },
    nodes::spatial::{Node3d, SpatialNode, Transform},
    postprocess::Composer,
    reactive::{Channel, Property},
    render::RenderCallback,
    viewport::Viewport,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightConfig {
    pub kind: LightKind,
    pub transform: Transform,
    /// Sky colour for hemisphere lights.
    pub color: Color,
    pub intensity: f32,
    pub cast_shadow: bool,
    /// Aim point of a directional or spot light.
    pub target: Vector3<f32>,
    /// Intensity `fade_in` and `pop_in` bring the light up to. Defaults to
    /// `intensity`.
    pub lit_intensity: Option<f32>,
}

impl LightConfig {
    pub fn point() -> Self {
        Self {
            kind: LightKind::Point {
                distance: 0.0,
                decay: 1.0,
            },
            intensity: 1.2,
            ..Self::directional()
        }
    }

    pub fn directional() -> Self {
        Self {
            kind: LightKind::Directional,
            transform: Transform::default(),
            color: Color::WHITE,
            intensity: 2.0,
            cast_shadow: false,
            target: Vector3::new(0.0, 0.0, 0.0),
            lit_intensity: None,
        }
    }

    /// A narrow golden spot shining straight down from `position`. It starts
    /// dark and fades in to 5.
    pub fn tower_spot(position: Vector3<f32>, radius: f32) -> Self {
        Self {
            kind: LightKind::Spot {
                distance: 10.0,
                angle: 0.2 * radius,
                penumbra: 0.3,
                decay: 2.0,
            },
            color: Color::from_hex(0xffd700),
            intensity: 0.0,
            lit_intensity: Some(5.0),
            cast_shadow: true,
            target: position - Vector3::new(0.0, 5.0, 0.0),
            ..Self::directional().at(position)
        }
    }

    pub fn hemisphere() -> Self {
        Self {
            kind: LightKind::Hemisphere {
                ground: Color::from_hex(0x444444),
            },
            color: Color::from_hex(0xaaaaaa),
            intensity: 0.6,
            ..Self::directional()
        }
    }

    pub fn ambient() -> Self {
        Self {
            kind: LightKind::Ambient,
            color: Color::from_hex(0x404040),
            intensity: 0.2,
            ..Self::directional()
        }
    }

    pub fn at(self, position: Vector3<f32>) -> Self {
        Self {
            transform: Transform::at(position),
            ..self
        }
    }
}

impl Default for LightConfig {
    fn default() -> Self {
        Self::point()
    }
}

#[derive(Clone)]
pub struct Light {
    spatial: SpatialNode,
    light: Object3d,
    kind: LightKind,
    lit_intensity: f32,
    intensity: Property<f32>,
    color: Property<Color>,
    look_at: Option<Property<Vector3<f32>>>,
}

impl Light {
    pub fn new(config: LightConfig) -> Self {
        let core = Object3d::group().named("light rig");
        let target = config.kind.is_aimed().then(|| {
            let target = Object3d::group().named("light target");
            target.set_position(config.target);
            core.add(&target);
            target
        });
        let light = Object3d::new(ObjectKind::Light(LightData {
            kind: config.kind,
            color: config.color,
            intensity: config.intensity,
            shadow: config.cast_shadow.then(|| shadow_settings(config.kind)),
            target: target.clone(),
        }))
        .named(kind_name(config.kind));
        light.data_mut().cast_shadow = config.cast_shadow;
        core.add(&light);

        let spatial = SpatialNode::with_target(core, light.clone(), config.transform);
        let intensity = {
            let light = light.clone();
            Property::new(Channel::Intensity, config.intensity, move |v| {
                light.with_light_mut(|l| l.intensity = v);
            })
        };
        let color = {
            let light = light.clone();
            Property::new(Channel::Color, config.color, move |c| {
                light.with_light_mut(|l| l.color = c);
            })
        };
        let look_at = target.map(|target| {
            Property::new(Channel::LookAt, config.target, move |p| target.set_position(p))
        });

        Self {
            spatial,
            light,
            kind: config.kind,
            lit_intensity: config.lit_intensity.unwrap_or(config.intensity),
            intensity,
            color,
            look_at,
        }
    }

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    /// The wrapped light object.
    pub fn object(&self) -> &Object3d {
        &self.light
    }

    pub fn intensity(&self) -> &Property<f32> {
        &self.intensity
    }

    pub fn color(&self) -> &Property<Color> {
        &self.color
    }

    /// Aim point, directional and spot lights only.
    pub fn target(&self) -> Option<&Property<Vector3<f32>>> {
        self.look_at.as_ref()
    }

    pub async fn intensity_to(&self, value: f32, duration: f32, ease: Ease) {
        tween_property(&self.intensity, value, duration, ease).await
    }

    pub async fn color_to(&self, color: Color, duration: f32, ease: Ease) {
        tween_property(&self.color, color, duration, ease).await
    }

    pub async fn look_to(&self, target: Vector3<f32>, duration: f32, ease: Ease) {
        let Some(look_at) = &self.look_at else {
            log::warn!("Only directional and spot lights can be aimed, ignoring look_to on a {:?} light.", self.kind);
            return;
        };
        tween_property(look_at, target, duration, ease).await
    }

    pub async fn move_to(&self, position: Vector3<f32>, duration: f32, ease: Ease) {
        self.spatial.reposition(position, duration, ease).await
    }

    /// Brighten from the current intensity to the lit intensity.
    pub async fn fade_in(&self, duration: f32, ease: Ease) {
        self.intensity_to(self.lit_intensity, duration, ease).await
    }

    pub async fn fade_out(&self, duration: f32, ease: Ease) {
        self.intensity_to(0.0, duration, ease).await
    }

    /// Switch off, then scale, spin and brighten back to the lit intensity
    /// together.
    pub async fn pop_in(&self, duration: f32, ease: Ease) {
        self.intensity.set(0.0);
        futures::join!(
            self.spatial.pop_in(duration, 1.0, ease),
            self.intensity_to(self.lit_intensity, duration, ease),
        );
    }

    pub async fn pop_out(&self, duration: f32, ease: Ease) {
        futures::join!(
            self.spatial.pop_out(duration, ease),
            self.intensity_to(0.0, duration, ease),
        );
    }
}

fn kind_name(kind: LightKind) -> &'static str {
    match kind {
        LightKind::Point { .. } => "point light",
        LightKind::Directional => "directional light",
        LightKind::Hemisphere { .. } => "hemisphere light",
        LightKind::Ambient => "ambient light",
        LightKind::Spot { .. } => "spot light",
    }
}

fn shadow_settings(kind: LightKind) -> ShadowSettings {
    match kind {
        LightKind::Spot { .. } => ShadowSettings {
            bias: -0.0005,
            ..ShadowSettings::default()
        },
        _ => ShadowSettings::default(),
    }
}

impl Node3d for Light {
    fn spatial(&self) -> &SpatialNode {
        &self.spatial
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightRigConfig {
    pub transform: Transform,
    pub key: Option<LightConfig>,
    pub rim: Option<LightConfig>,
    pub hemisphere: Option<LightConfig>,
    pub ambient: Option<LightConfig>,
    pub point: Option<LightConfig>,
    pub directional: Option<LightConfig>,
    /// Bloom and tone mapping applied after every render of the viewport.
    pub post_processing: Option<PostProcessConfig>,
}

impl Default for LightRigConfig {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            key: Some(LightConfig {
                color: Color::from_hex(0xffe0dd),
                intensity: 2.0,
                cast_shadow: true,
                ..LightConfig::directional().at(Vector3::new(5.0, 10.0, 5.0))
            }),
            rim: Some(LightConfig {
                color: Color::from_hex(0x4466ff),
                intensity: 2.5,
                ..LightConfig::directional().at(Vector3::new(-8.0, 6.0, -4.0))
            }),
            hemisphere: Some(LightConfig {
                kind: LightKind::Hemisphere {
                    ground: Color::from_hex(0x202020),
                },
                color: Color::from_hex(0x406080),
                intensity: 0.3,
                ..LightConfig::hemisphere()
            }),
            ambient: Some(LightConfig::ambient()),
            point: None,
            directional: None,
            post_processing: None,
        }
    }
}

/// A group of lights, plus the post-processing chain that goes with them.
#[derive(Clone)]
pub struct LightRig {
    spatial: SpatialNode,
    key: Option<Light>,
    rim: Option<Light>,
    hemisphere: Option<Light>,
    ambient: Option<Light>,
    point: Option<Light>,
    directional: Option<Light>,
    post_processing: Option<PostProcessConfig>,
}

impl LightRig {
    pub fn new(config: LightRigConfig) -> Self {
        let spatial = SpatialNode::new(Object3d::group().named("lights"), config.transform);
        let build = |light: Option<LightConfig>| {
            light.map(|config| {
                let light = Light::new(config);
                spatial.add(&light);
                light
            })
        };
        Self {
            key: build(config.key),
            rim: build(config.rim),
            hemisphere: build(config.hemisphere),
            ambient: build(config.ambient),
            point: build(config.point),
            directional: build(config.directional),
            post_processing: config.post_processing,
            spatial,
        }
    }

    pub fn key(&self) -> Option<&Light> {
        self.key.as_ref()
    }

    pub fn rim(&self) -> Option<&Light> {
        self.rim.as_ref()
    }

    pub fn hemisphere(&self) -> Option<&Light> {
        self.hemisphere.as_ref()
    }

    pub fn ambient(&self) -> Option<&Light> {
        self.ambient.as_ref()
    }

    pub fn point(&self) -> Option<&Light> {
        self.point.as_ref()
    }

    pub fn directional(&self) -> Option<&Light> {
        self.directional.as_ref()
    }

    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        [
            &self.key,
            &self.rim,
            &self.hemisphere,
            &self.ambient,
            &self.point,
            &self.directional,
        ]
        .into_iter()
        .flatten()
    }
}

impl Node3d for LightRig {
    fn spatial(&self) -> &SpatialNode {
        &self.spatial
    }

    fn on_attach(&self, viewport: &Viewport) {
        let Some(config) = self.post_processing else {
            return;
        };
        viewport.wrap_render_callback(|render| with_composer(render, &config));
        log::debug!("Light rig installed post-processing: {:?}", config);
    }
}

/// Run `render`, then the post-processing chain over the frame it produced.
fn with_composer(render: RenderCallback, config: &PostProcessConfig) -> RenderCallback {
    let composer = RefCell::new(Composer::new(config));
    Rc::new(move |renderer, scene, camera| {
        render(renderer, scene, camera)?;
        composer.borrow_mut().process(renderer.frame_mut())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rig_has_the_studio_lights() {
        let rig = LightRig::new(LightRigConfig::default());
        assert_eq!(rig.lights().count(), 4);
        let key = rig.key().expect("key light");
        assert_eq!(key.intensity().get(), 2.0);
        assert!(key.object().data().cast_shadow);
        assert_eq!(rig.rim().map(|l| l.color().get()), Some(Color::from_hex(0x4466ff)));
        assert!(rig.point().is_none());
    }

    #[test]
    fn intensity_and_colour_reach_the_light_object() {
        let light = Light::new(LightConfig::point());
        light.intensity().set(0.5);
        light.color().set(Color::BLACK);
        let data = light.object().light().expect("light object");
        assert_eq!(data.intensity, 0.5);
        assert_eq!(data.color, Color::BLACK);
    }

    #[test]
    fn only_aimed_lights_have_a_target() {
        let sun = Light::new(LightConfig::directional());
        assert!(sun.target().is_some());
        assert_eq!(sun.spatial().core().child_count(), 2);
        let spot = Light::new(LightConfig::tower_spot(Vector3::new(0.0, 1.0, 0.0), 0.7));
        assert_eq!(spot.spatial().core().child_count(), 2);
        assert!(Light::new(LightConfig::ambient()).target().is_none());
        assert!(Light::new(LightConfig::point()).target().is_none());
    }

    #[test]
    fn tower_spot_starts_dark_and_aims_down() {
        let spot = Light::new(LightConfig::tower_spot(Vector3::new(2.0, 1.0, 0.0), 0.7));
        assert_eq!(spot.intensity().get(), 0.0);
        assert_eq!(spot.target().map(|t| t.get()), Some(Vector3::new(2.0, -4.0, 0.0)));
        assert_eq!(spot.object().position(), Vector3::new(2.0, 1.0, 0.0));
        let shadow = spot.object().light().and_then(|l| l.shadow);
        assert_eq!(shadow.map(|s| s.bias), Some(-0.0005));
    }
}
