mod common;

use std::{cell::Cell, rc::Rc};

use futures::FutureExt;
use stage3d::{
    Vector2, Vector3,
    anim::{all, ease, next_frame, wait_for},
    config::{StageConfig, ViewportConfig},
    data_structures::{color::Color, material::Material},
    flow::{Stage, init_logger},
    nodes::{
        camera::Camera,
        label::{Label, LabelConfig, Palette, Tracked},
        mesh::Cuboid,
        spatial::{Node3d, Transform},
    },
};

use crate::common::test_utils::{FakeRenderer, assert_close};

fn stage(width: u32, height: u32) -> Stage {
    init_logger();
    let (renderer, _) = FakeRenderer::new(Color::new(0.1, 0.1, 0.1));
    Stage::headless(
        StageConfig {
            width,
            height,
            max_frames: 600,
            viewport: ViewportConfig {
                width,
                height,
                ..Default::default()
            },
            ..Default::default()
        },
        Box::new(renderer),
    )
}

#[test]
fn play_draws_the_first_frame_and_one_per_tick() {
    let mut stage = stage(32, 32);
    let mut seen = Vec::new();
    let frames = stage
        .play(
            async {
                for _ in 0..10 {
                    next_frame().await;
                }
            },
            |index, _| {
                seen.push(index);
                Ok(())
            },
        )
        .expect("play succeeds");
    assert_eq!(frames, 11);
    assert_eq!(seen, (0..11).collect::<Vec<_>>());
    assert_eq!(stage.frame_index(), 11);
}

#[test]
fn play_waits_for_spawned_animations() {
    let mut stage = stage(32, 32);
    let cube = Cuboid::new(Material::standard(Color::WHITE), Transform::default());
    stage.viewport().add(&cube);

    let c = cube.clone();
    let spawner = stage.scheduler().spawner();
    let frames = stage
        .play(
            async move {
                spawner.spawn(async move { c.move_up(1.0, 1.0, ease::ease_in_out_cubic).await });
            },
            |_, _| Ok(()),
        )
        .expect("play succeeds");
    assert!(frames >= 60, "stopped after {frames} frames");
    assert_close(cube.position().get().y, 1.0);
}

#[test]
fn play_stops_at_the_frame_cap() {
    let mut stage = stage(16, 16);
    let frames = stage
        .play(
            async {
                for _ in 0..100_000 {
                    next_frame().await;
                }
            },
            |_, _| Ok(()),
        )
        .expect("play succeeds");
    assert_eq!(frames, 600);
}

#[test]
fn sink_errors_abort_playback() {
    let mut stage = stage(16, 16);
    let result = stage.play(wait_for(1.0), |index, _| {
        if index == 3 {
            anyhow::bail!("disk full");
        }
        Ok(())
    });
    assert!(result.is_err());
    assert_eq!(stage.frame_index(), 4);
}

#[test]
fn barriers_order_independent_tasks() {
    let mut stage = stage(16, 16);
    let barriers = stage.barriers().clone();
    let order = Rc::new(Cell::new(0u32));

    let (b, o) = (barriers.clone(), order.clone());
    let waiter = async move {
        b.wait_until("intro done").await;
        assert_eq!(o.get(), 1);
        o.set(2);
    };
    let (b, o) = (barriers.clone(), order.clone());
    let intro = async move {
        wait_for(0.25).await;
        o.set(1);
        b.signal("intro done");
    };
    stage
        .play(
            async move {
                all([waiter.boxed_local(), intro.boxed_local()]).await
            },
            |_, _| Ok(()),
        )
        .expect("play succeeds");
    assert_eq!(order.get(), 2);
    assert!(barriers.is_raised("intro done"));
}

#[test]
fn label_follows_its_node() {
    let mut stage = stage(400, 200);
    let camera = Camera::default();
    let cube = Cuboid::new(Material::standard(Color::WHITE), Transform::default());
    stage.viewport().add(&camera);
    stage.viewport().add(&cube);
    let label = Label::new(LabelConfig {
        text: "cube".to_string(),
        tracked: Tracked::Node(cube.spatial().clone()),
        offset: Vector2::new(0.0, 0.0),
        ..Default::default()
    });
    stage.add_label(&label);

    let l = label.clone();
    stage
        .play(async move { l.show().await }, |_, _| Ok(()))
        .expect("play succeeds");
    let centred = label.position();
    assert_close(centred.x, 0.0);
    assert_close(label.scale().get(), 1.0);

    let c = cube.clone();
    stage
        .play(
            async move { c.reposition(Vector3::new(1.0, 0.0, 0.0), 0.5, ease::linear).await },
            |_, _| Ok(()),
        )
        .expect("play succeeds");
    assert!(label.position().x > centred.x, "{:?}", label.position());
}

#[test]
fn shown_label_fills_its_box_with_the_dark_colour() {
    let mut stage = stage(200, 100);
    let label = Label::new(LabelConfig {
        text: "ALU".to_string(),
        offset: Vector2::new(0.0, 0.0),
        palette: Palette::Alu,
        ..Default::default()
    });
    stage.add_label(&label);

    let l = label.clone();
    stage
        .play(async move { l.show().await }, |_, _| Ok(()))
        .expect("play succeeds");
    assert_eq!(*stage.canvas().image().get_pixel(100, 50), Palette::Alu.fill());
    assert_eq!(Palette::Alu.fill(), image::Rgba([0xff, 0x6a, 0x00, 0xff]));
}

#[test]
fn hidden_labels_draw_nothing() {
    let mut stage = stage(64, 64);
    let label = Label::new(LabelConfig {
        text: "never shown".to_string(),
        ..Default::default()
    });
    stage.add_label(&label);
    stage.play(async {}, |_, _| Ok(())).expect("play succeeds");
    let background = *stage.canvas().image().get_pixel(0, 0);
    assert!(stage.canvas().image().pixels().all(|p| *p == background));
}

#[test]
fn render_to_dir_writes_numbered_pngs() {
    let dir = std::env::temp_dir().join(format!("stage3d-frames-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let mut stage = stage(24, 12);

    let frames = stage
        .render_to_dir(
            async {
                next_frame().await;
                next_frame().await;
            },
            &dir,
        )
        .expect("frames are written");
    assert_eq!(frames, 3);
    for i in 0..3 {
        let path = dir.join(format!("frame_{:05}.png", i));
        let image = image::open(&path).expect("frame is a png");
        assert_eq!((image.width(), image.height()), (24, 12));
    }
    assert!(!dir.join("frame_00003.png").exists());
    std::fs::remove_dir_all(&dir).expect("temp dir removed");
}
