mod common;

use stage3d::{
    Vector3,
    anim::{Scheduler, ease},
    data_structures::{color::Color, scene_graph::LightData},
    nodes::{
        lights::{Light, LightConfig},
        spatial::Node3d,
    },
};

use crate::common::test_utils::{assert_close, drive, viewport};

fn attached(config: LightConfig) -> (Scheduler, Light) {
    let (scheduler, viewport, _) = viewport();
    let light = Light::new(config);
    viewport.add(&light);
    viewport.init();
    (scheduler, light)
}

fn data(light: &Light) -> LightData {
    light.object().light().expect("light object")
}

fn assert_vec_close(actual: Vector3<f32>, expected: Vector3<f32>) {
    assert_close(actual.x, expected.x);
    assert_close(actual.y, expected.y);
    assert_close(actual.z, expected.z);
}

#[test]
fn intensity_and_colour_tweens_reach_the_light() {
    let (mut scheduler, light) = attached(LightConfig::point());

    let l = light.clone();
    drive(
        &mut scheduler,
        async move {
            futures::join!(
                l.intensity_to(3.0, 0.4, ease::ease_in_out_cubic),
                l.color_to(Color::new(1.0, 0.5, 0.0), 0.4, ease::linear),
            );
        },
        60,
    );

    let data = data(&light);
    assert_close(data.intensity, 3.0);
    assert_close(data.color.g, 0.5);
    assert_close(light.intensity().get(), 3.0);
}

#[test]
fn directional_look_to_moves_the_target_helper() {
    let (mut scheduler, sun) = attached(LightConfig::directional().at(Vector3::new(0.0, 5.0, 0.0)));
    let helper = data(&sun).target.expect("directional lights own a target");
    assert!(
        helper
            .parent()
            .is_some_and(|parent| parent.ptr_eq(sun.spatial().core()))
    );

    let aim = Vector3::new(3.0, 0.0, -2.0);
    let l = sun.clone();
    drive(&mut scheduler, async move { l.look_to(aim, 0.5, ease::ease_in_out_cubic).await }, 60);

    assert_vec_close(helper.position(), aim);
    assert_eq!(sun.target().map(|t| t.get()), Some(aim));
    assert_eq!(sun.object().position(), Vector3::new(0.0, 5.0, 0.0));
}

#[test]
fn lights_without_a_target_ignore_look_to() {
    let (mut scheduler, lamp) = attached(LightConfig::point());
    let l = lamp.clone();
    drive(
        &mut scheduler,
        async move { l.look_to(Vector3::new(1.0, 1.0, 1.0), 0.5, ease::linear).await },
        1,
    );
    assert!(data(&lamp).target.is_none());
}

#[test]
fn position_tweens_move_the_light_not_its_core() {
    let (mut scheduler, lamp) = attached(LightConfig::point());
    let to = Vector3::new(-1.0, 4.0, 2.0);

    let l = lamp.clone();
    drive(&mut scheduler, async move { l.move_to(to, 0.5, ease::ease_in_out_cubic).await }, 60);

    assert_vec_close(lamp.object().position(), to);
    assert_eq!(lamp.spatial().core().position(), Vector3::new(0.0, 0.0, 0.0));
}

#[test]
fn pop_in_restores_the_configured_intensity() {
    let (mut scheduler, lamp) = attached(LightConfig {
        intensity: 1.5,
        ..LightConfig::point()
    });

    let l = lamp.clone();
    scheduler.spawn(async move { l.pop_in(0.4, ease::ease_out_sine).await });
    scheduler.settle();
    assert_eq!(lamp.intensity().get(), 0.0);
    scheduler.run_until_idle(60);

    assert_close(lamp.intensity().get(), 1.5);
    assert_close(lamp.spatial().scale().get().x, 1.0);
}

#[test]
fn pop_out_darkens_and_shrinks() {
    let (mut scheduler, lamp) = attached(LightConfig::point());
    let yaw = lamp.spatial().rotation().get().y;

    let l = lamp.clone();
    drive(&mut scheduler, async move { l.pop_out(0.4, ease::ease_in_sine).await }, 60);

    assert_close(lamp.intensity().get(), 0.0);
    assert_close(lamp.spatial().scale().get().y, 0.0);
    assert_close(lamp.spatial().rotation().get().y, yaw + 1.0);
}

#[test]
fn tower_spot_fades_in_aims_and_fades_out() {
    let (mut scheduler, spot) = attached(LightConfig::tower_spot(Vector3::new(0.0, 1.0, 0.0), 0.7));
    assert_eq!(data(&spot).intensity, 0.0);
    assert_eq!(spot.target().map(|t| t.get()), Some(Vector3::new(0.0, -4.0, 0.0)));

    let s = spot.clone();
    drive(
        &mut scheduler,
        async move {
            s.fade_in(0.4, ease::ease_out_sine).await;
            futures::join!(
                s.move_to(Vector3::new(2.0, 3.0, 0.0), 0.5, ease::ease_in_out_cubic),
                s.look_to(Vector3::new(2.0, 0.0, 1.0), 0.5, ease::ease_in_out_cubic),
            );
        },
        90,
    );
    assert_close(data(&spot).intensity, 5.0);
    assert_vec_close(spot.object().position(), Vector3::new(2.0, 3.0, 0.0));
    let helper = data(&spot).target.expect("spot lights own a target");
    assert_vec_close(helper.position(), Vector3::new(2.0, 0.0, 1.0));

    let s = spot.clone();
    drive(&mut scheduler, async move { s.fade_out(0.4, ease::ease_in_sine).await }, 60);
    assert_close(data(&spot).intensity, 0.0);
}
