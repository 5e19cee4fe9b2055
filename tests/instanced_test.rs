mod common;

use std::rc::Rc;

use stage3d::{
    Matrix4, Vector3,
    anim::ease,
    data_structures::{color::Color, geometry::Geometry, material::Material},
    nodes::{
        instanced::{InstancedBatch, InstancedBatchConfig},
        spatial::Node3d,
    },
};

use crate::common::test_utils::{assert_close, drive, memory_loader, viewport};

fn row(amount: usize, special_indices: Vec<usize>) -> InstancedBatchConfig {
    InstancedBatchConfig {
        src: "crate.glb".to_string(),
        loader: Some(memory_loader()),
        amount,
        special_indices,
        position_fn: Rc::new(|i| Vector3::new(i as f32, 0.0, 0.0)),
        ..Default::default()
    }
}

fn translation(m: &Matrix4<f32>) -> Vector3<f32> {
    m.w.truncate()
}

fn loaded(config: InstancedBatchConfig) -> (stage3d::anim::Scheduler, InstancedBatch) {
    let (mut scheduler, viewport, _) = viewport();
    let batch = InstancedBatch::new(config);
    viewport.add(&batch);
    viewport.init();
    let b = batch.clone();
    drive(&mut scheduler, async move { assert!(b.until_loaded().await) }, 10);
    (scheduler, batch)
}

#[test]
fn specials_are_left_out_of_the_instanced_draw() {
    let batch = InstancedBatch::new(row(10, vec![7, 3, 3, 42]));
    assert_eq!(batch.regular_count(), 8);
    assert_eq!(batch.regular_indices(), &[0, 1, 2, 4, 5, 6, 8, 9]);
    assert_eq!(batch.special_indices().collect::<Vec<_>>(), vec![3, 7]);
    assert!(!batch.is_loaded());
    assert!(batch.instance_matrices().is_empty());
}

#[test]
fn loaded_batch_places_regular_instances_in_slot_order() {
    let (_scheduler, batch) = loaded(row(10, vec![3, 7]));
    let matrices = batch.instance_matrices();
    assert_eq!(matrices.len(), 8);
    for (slot, index) in batch.regular_indices().iter().enumerate() {
        assert_close(translation(&matrices[slot]).x, *index as f32);
    }
    assert_eq!(batch.instancers().len(), 1);

    let special = batch.special(3).expect("index 3 is special");
    assert_eq!(special.position().get(), Vector3::new(3.0, 0.0, 0.0));
    assert!(special.is_attached());
    assert!(batch.special(4).is_none());
}

#[test]
fn instances_carry_the_batch_colour() {
    let (_scheduler, batch) = loaded(InstancedBatchConfig {
        color: Color::from_hex(0xff0000),
        ..row(4, vec![])
    });
    let colors = batch.instancers()[0]
        .with_instanced(|data| data.colors.clone())
        .expect("instanced object");
    assert_eq!(colors, vec![Color::from_hex(0xff0000); 4]);
}

#[test]
fn move_all_is_additive() {
    let (mut scheduler, batch) = loaded(row(5, vec![2]));
    let before = batch.instance_matrices();
    let first = Vector3::new(0.0, 1.0, 0.0);
    let second = Vector3::new(2.0, 0.0, -1.0);

    let b = batch.clone();
    drive(
        &mut scheduler,
        async move {
            b.move_all(first, 0.5, ease::linear).await;
            b.move_all(second, 0.5, ease::ease_in_out_cubic).await;
        },
        90,
    );

    let after = batch.instance_matrices();
    for (a, b) in before.iter().zip(&after) {
        let moved = translation(b) - translation(a);
        assert_close(moved.x, 2.0);
        assert_close(moved.y, 1.0);
        assert_close(moved.z, -1.0);
    }
    assert_eq!(
        batch.special(2).map(|m| m.position().get()),
        Some(Vector3::new(2.0, 0.0, 0.0))
    );
}

#[test]
fn move_selected_down_only_touches_the_named_specials() {
    let (mut scheduler, batch) = loaded(row(10, vec![3, 7]));
    let before = batch.instance_matrices();

    let b = batch.clone();
    drive(
        &mut scheduler,
        async move { b.move_selected_down(&[3, 7, 5], 2.0, 0.5, ease::ease_in_quad).await },
        60,
    );

    assert_eq!(batch.instance_matrices(), before);
    for i in [3, 7] {
        let p = batch.special(i).expect("special").position().get();
        assert_close(p.x, i as f32);
        assert_close(p.y, -2.0);
    }
}

#[test]
fn modify_reshapes_the_template_for_every_instance() {
    let config = InstancedBatchConfig {
        modify: Some(Rc::new(|geometry: &mut Geometry, material: &mut Material, index: usize| {
            assert_eq!(index, 0);
            for p in &mut geometry.positions {
                p[1] += 10.0;
            }
            material.color = Color::from_hex(0x00ff00);
        })),
        ..row(6, vec![1, 4])
    };
    let (_scheduler, batch) = loaded(config);

    let instancer = &batch.instancers()[0];
    assert_eq!(instancer.material().map(|m| m.color), Some(Color::from_hex(0x00ff00)));
    let shared = instancer.geometry().expect("instanced geometry");
    let special = batch.special(4).expect("special").content().expect("content");
    assert_eq!(special.material().map(|m| m.color), Some(Color::from_hex(0x00ff00)));
    assert!(Rc::ptr_eq(&shared, &special.geometry().expect("special geometry")));

    let untouched = Geometry::cuboid(1.0, 1.0, 1.0);
    assert_close(shared.positions[0][1] - untouched.positions[0][1], 10.0);
}

#[test]
fn modify_special_runs_on_a_copy_per_special() {
    let config = InstancedBatchConfig {
        modify_special: Some(Rc::new(|geometry: &mut Geometry, material: &mut Material, index: usize| {
            for p in &mut geometry.positions {
                p[1] += index as f32;
            }
            material.color = Color::WHITE;
        })),
        ..row(6, vec![1, 4])
    };
    let (_scheduler, batch) = loaded(config);

    let template = batch.instancers()[0].geometry().expect("instanced geometry");
    let special = batch.special(4).expect("special").content().expect("content");
    let modified = special.geometry().expect("special geometry");
    assert!(!Rc::ptr_eq(&template, &modified));
    assert_close(modified.positions[0][1] - template.positions[0][1], 4.0);
    assert_eq!(special.material().map(|m| m.color), Some(Color::WHITE));
}

#[test]
fn missing_template_leaves_the_batch_empty() {
    let (mut scheduler, viewport, _) = viewport();
    let batch = InstancedBatch::new(InstancedBatchConfig {
        src: "missing.glb".to_string(),
        ..row(3, vec![1])
    });
    viewport.add(&batch);
    viewport.init();

    let b = batch.clone();
    drive(&mut scheduler, async move { assert!(!b.until_loaded().await) }, 10);
    assert!(!batch.is_loaded());
    assert!(batch.instancers().is_empty());
    assert!(batch.special(1).is_none());
    assert_eq!(batch.spatial().core().child_count(), 0);
}
