mod common;

use std::rc::Rc;

use stage3d::{
    Vector3,
    anim::ease,
    data_structures::{
        color::Color,
        geometry::Geometry,
        material::{Material, MaterialKind},
    },
    nodes::{
        floor::Floor,
        grid::Grid,
        group::Group,
        line::{Line, LineConfig},
        mesh::{Mesh, MeshConfig},
        model::{LoadState, Model, ModelConfig},
        spatial::{Axis, Transform, init_node},
    },
    resources::{AssetLoader, memory::MemoryLoader},
};

use crate::common::test_utils::{assert_close, drive, memory_loader, viewport};

fn cube() -> Mesh {
    Mesh::with_content(
        Rc::new(Geometry::cuboid(1.0, 1.0, 1.0)),
        Material::standard(Color::WHITE),
        Transform::default(),
    )
}

#[test]
fn init_twice_attaches_once() {
    let (_scheduler, viewport, _) = viewport();
    let group = Group::default();
    group.add(&cube());
    viewport.add(&group);

    viewport.init();
    viewport.init();
    init_node(&group, &viewport, viewport.scene().root());

    assert_eq!(viewport.scene().root().child_count(), 1);
    assert_eq!(group.core().child_count(), 1);
    assert!(group.is_attached());
}

#[test]
fn children_attach_with_their_parent() {
    let (_scheduler, viewport, _) = viewport();
    let group = Group::new(Transform::at(Vector3::new(1.0, 0.0, 0.0)));
    let mesh = cube();
    group.add(&mesh);
    assert!(!mesh.is_attached());

    viewport.add(&group);
    viewport.init();

    assert!(mesh.is_attached());
    assert!(mesh.viewport().is_some());
    assert!(
        mesh.core()
            .parent()
            .is_some_and(|parent| parent.ptr_eq(group.core()))
    );
}

#[test]
fn child_added_to_an_attached_node_attaches_immediately() {
    let (_scheduler, viewport, _) = viewport();
    let group = Group::default();
    viewport.add(&group);
    viewport.init();

    let late = cube();
    group.add(&late);
    assert!(late.is_attached());
    assert_eq!(group.children().len(), 1);
}

#[test]
fn global_position_includes_parents() {
    let (_scheduler, viewport, _) = viewport();
    let group = Group::new(Transform::at(Vector3::new(1.0, 2.0, 3.0)));
    let mesh = Mesh::with_content(
        Rc::new(Geometry::cuboid(1.0, 1.0, 1.0)),
        Material::basic(Color::WHITE),
        Transform::at(Vector3::new(0.0, 1.0, 0.0)),
    );
    group.add(&mesh);
    viewport.add(&group);
    viewport.init();

    let p = mesh.global_position();
    assert_close(p.x, 1.0);
    assert_close(p.y, 3.0);
    assert_close(p.z, 3.0);
}

#[test]
fn property_writes_reach_the_scene_object() {
    let mesh = cube();
    mesh.position().set(Vector3::new(0.0, 2.0, 0.0));
    assert_eq!(mesh.core().position(), Vector3::new(0.0, 2.0, 0.0));

    mesh.position().set_signal_only(Vector3::new(5.0, 5.0, 5.0));
    assert_eq!(mesh.position().get(), Vector3::new(5.0, 5.0, 5.0));
    assert_eq!(mesh.core().position(), Vector3::new(0.0, 2.0, 0.0));

    mesh.position().sync();
    assert_eq!(mesh.core().position(), Vector3::new(5.0, 5.0, 5.0));
}

#[test]
fn animations_land_on_their_targets() {
    let (mut scheduler, viewport, _) = viewport();
    let mesh = cube();
    viewport.add(&mesh);
    viewport.init();

    let m = mesh.clone();
    drive(
        &mut scheduler,
        async move {
            m.reposition(Vector3::new(1.0, 0.0, 0.0), 0.5, ease::linear).await;
            m.move_up(2.0, 0.5, ease::ease_in_out_cubic).await;
            m.expand(2.0, 0.25, ease::ease_in_out_cubic).await;
        },
        120,
    );
    let p = mesh.core().position();
    assert_close(p.x, 1.0);
    assert_close(p.y, 2.0);
    assert_close(mesh.core().scale().x, 2.0);
}

#[test]
fn pop_in_then_out() {
    let (mut scheduler, viewport, _) = viewport();
    let mesh = cube();
    viewport.add(&mesh);
    viewport.init();

    let m = mesh.clone();
    drive(&mut scheduler, async move { m.pop_in(0.5, 1.5, ease::ease_out_back).await }, 60);
    assert_close(mesh.scale().get().y, 1.5);

    let m = mesh.clone();
    drive(&mut scheduler, async move { m.pop_out(0.5, ease::ease_in_quad).await }, 60);
    assert_close(mesh.scale().get().y, 0.0);
}

#[test]
fn idle_rotation_turns_every_frame() {
    let (mut scheduler, viewport, _) = viewport();
    let mesh = cube();
    viewport.add(&mesh);
    viewport.init();

    let m = mesh.clone();
    scheduler.spawn(async move { m.idle_rotation(&[Axis::Y], 1.0).await });
    scheduler.settle();
    let mut last = mesh.rotation().get().y;
    for _ in 0..10 {
        scheduler.tick();
        let now = mesh.rotation().get().y;
        assert!(now > last, "rotation stalled at {now}");
        last = now;
    }
    assert_eq!(mesh.rotation().get().x, 0.0);
}

#[test]
fn mesh_without_both_parts_has_no_content() {
    let mesh = Mesh::new(MeshConfig::default());
    assert!(mesh.content().is_none());
    assert!(!mesh.set_content(None, Some(Material::basic(Color::WHITE))));
    assert!(!mesh.set_content(Some(Rc::new(Geometry::plane(1.0, 1.0))), None));
    assert!(mesh.content().is_none());
    assert_eq!(mesh.core().child_count(), 0);
}

#[test]
fn mesh_content_replaces_the_old_object() {
    let mesh = cube();
    assert!(mesh.set_content(
        Some(Rc::new(Geometry::plane(1.0, 1.0))),
        Some(Material::basic(Color::WHITE))
    ));
    assert_eq!(mesh.core().child_count(), 1);
}

#[test]
fn reflective_meshes_become_mirrors() {
    let mesh = Mesh::new(MeshConfig {
        geometry: Some(Rc::new(Geometry::sphere(1.0, 8, 8))),
        material: Some(Material::standard(Color::WHITE)),
        reflective: true,
        ..Default::default()
    });
    let material = mesh.content().and_then(|c| c.material()).expect("mesh has content");
    match material.kind {
        MaterialKind::Standard { metalness, roughness } => {
            assert_eq!(metalness, 1.0);
            assert_eq!(roughness, 0.0);
        }
        other => panic!("expected a standard material, got {other:?}"),
    }
}

#[test]
fn mesh_fades_in_and_out() {
    let (mut scheduler, viewport, _) = viewport();
    let mesh = Mesh::new(MeshConfig {
        geometry: Some(Rc::new(Geometry::cuboid(1.0, 1.0, 1.0))),
        material: Some(Material::standard(Color::WHITE)),
        alpha: 0.0,
        ..Default::default()
    });
    viewport.add(&mesh);
    viewport.init();
    assert_eq!(mesh.material().map(|m| m.opacity), Some(0.0));

    let m = mesh.clone();
    drive(&mut scheduler, async move { m.fade_in(0.4, ease::ease_out_sine).await }, 60);
    assert_close(mesh.material().expect("content").opacity, 1.0);

    let m = mesh.clone();
    drive(&mut scheduler, async move { m.fade_out(0.4, ease::ease_in_sine).await }, 60);
    let material = mesh.material().expect("content");
    assert_close(material.opacity, 0.0);
    assert!(material.is_transparent());
}

#[test]
fn floor_stacks_a_faint_mirror_on_a_dark_tint() {
    let (_scheduler, viewport, _) = viewport();
    let floor = Floor::default();
    viewport.add(&floor);
    viewport.init();

    let tint = floor.tint().content().expect("tint plane");
    let mirror = floor.mirror().content().expect("mirror plane");
    assert_close(floor.tint().global_position().y, -0.4);
    assert_close(floor.mirror().global_position().y, -0.399);
    assert!(tint.data().receive_shadow);
    assert_eq!(tint.data().render_order, 0);
    assert_eq!(mirror.data().render_order, 1);

    let tint = tint.material().expect("tint material");
    assert_eq!(tint.color, Color::BLACK);
    assert_eq!(tint.env_map_intensity, 0.1);
    assert!(matches!(
        tint.kind,
        MaterialKind::Standard { metalness, roughness } if metalness == 1.0 && roughness == 0.6
    ));

    let mirror = mirror.material().expect("mirror material");
    assert_close(mirror.opacity, 0.3);
    assert!(mirror.is_transparent());
    assert!(matches!(
        mirror.kind,
        MaterialKind::Standard { metalness, roughness } if metalness == 1.0 && roughness == 0.0
    ));
}

#[test]
fn straight_and_smooth_lines() {
    let points = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 0.0)];
    let straight = Line::new(LineConfig {
        points: points.clone(),
        smooth: false,
        ..Default::default()
    });
    assert_eq!(straight.vertex_count(), 2);

    let smooth = Line::new(LineConfig {
        points,
        smooth: true,
        ..Default::default()
    });
    assert_eq!(smooth.vertex_count(), 25);
}

#[test]
fn grid_is_a_coloured_line_mesh() {
    let grid = Grid::default();
    let content = grid.content().expect("grid has content");
    let material = content.material().expect("grid has a material");
    assert!(material.vertex_colors);
    assert!(material.line_width().is_some());
    assert!(content.position().y > 0.0);
}

#[test]
fn model_moves_through_its_load_states() {
    let (mut scheduler, viewport, _) = viewport();
    let loader = Rc::new(MemoryLoader::new().with_latency(2));
    loader.insert_model("box.gltf", crate::common::test_utils::two_part_model("box.gltf"));
    let model = Model::new(ModelConfig {
        src: "box.gltf".to_string(),
        loader: Some(loader.clone() as Rc<dyn AssetLoader>),
        ..Default::default()
    });
    assert_eq!(model.state(), LoadState::Idle);

    viewport.add(&model);
    viewport.init();
    scheduler.settle();
    assert_eq!(model.state(), LoadState::Loading);
    assert!(model.content().is_none());

    let m = model.clone();
    drive(&mut scheduler, async move { assert!(m.until_loaded().await) }, 10);
    assert_eq!(model.state(), LoadState::Loaded);
    assert_eq!(loader.model_loads(), 1);

    let content = model.content().expect("content after load");
    let mut meshes = 0;
    content.traverse(&mut |o| meshes += usize::from(o.material().is_some()));
    assert_eq!(meshes, 2);
}

#[test]
fn missing_model_fails_without_content() {
    let (mut scheduler, viewport, _) = viewport();
    let model = Model::new(ModelConfig {
        src: "nowhere.glb".to_string(),
        loader: Some(memory_loader()),
        ..Default::default()
    });
    viewport.add(&model);
    viewport.init();

    let m = model.clone();
    drive(&mut scheduler, async move { assert!(!m.until_loaded().await) }, 10);
    assert_eq!(model.state(), LoadState::Failed);
    assert!(model.content().is_none());
}

#[test]
fn model_fade_reaches_every_material() {
    let (mut scheduler, viewport, _) = viewport();
    let model = Model::new(ModelConfig {
        src: "box.gltf".to_string(),
        loader: Some(memory_loader()),
        ..Default::default()
    });
    viewport.add(&model);
    viewport.init();

    let m = model.clone();
    drive(
        &mut scheduler,
        async move {
            m.until_loaded().await;
            m.opacity_to(0.5, 0.25, ease::linear).await;
        },
        60,
    );
    let content = model.content().expect("content after load");
    content.traverse(&mut |o| {
        if let Some(material) = o.material() {
            assert_close(material.opacity, 0.5);
            assert!(material.is_transparent());
        }
    });
}

#[test]
fn flow_markers_travel_and_clean_up() {
    let (mut scheduler, viewport, _) = viewport();
    let line = Line::new(LineConfig {
        points: vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.5, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
        ],
        smooth: true,
        ..Default::default()
    });
    viewport.add(&line);
    viewport.init();
    let drawn = line.core().child_count();

    let l = line.clone();
    scheduler.spawn(async move { l.current_flow(0.5, ease::ease_in_sine, 10.0).await });
    scheduler.settle();
    let mut peak = 0;
    while !scheduler.is_idle() {
        scheduler.tick();
        peak = peak.max(line.core().child_count() - drawn);
    }
    assert!(peak > 0 && peak <= 5, "peak of {peak} markers");
    assert_eq!(line.core().child_count(), drawn);
}
