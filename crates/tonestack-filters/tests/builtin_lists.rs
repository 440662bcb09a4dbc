//! Integration tests: built-in filters inside a filter list.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use image::Rgba;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tonestack_filters::{
    CURVES_ID, CurveChannel, CurvesFilter, HSL_KEYER_ID, HslKeyerFilter, OutputMode, registry,
};
use tonestack_pipeline::{FilterList, Image, Knot, Knots, RunOutcome};

fn list() -> FilterList {
    let mut list = FilterList::new(Arc::new(registry())).unwrap();
    list.set_auto_run(false);
    list
}

fn gradient() -> Image {
    Image::from_fn(32, 8, |x, y| {
        Rgba([(x * 8) as u8, (y * 32) as u8, 255 - (x * 8) as u8, 255])
    })
}

fn run(list: &mut FilterList) -> Arc<Image> {
    match list.request_recompute().unwrap().wait() {
        RunOutcome::Completed { image, .. } => image,
        other => panic!("run did not complete: {other:?}"),
    }
}

fn configured(list: &mut FilterList) {
    list.insert_by_id(0, CURVES_ID).unwrap();
    list.insert_by_id(1, HSL_KEYER_ID).unwrap();
    list.edit_filter_as::<CurvesFilter, _>(0, |f| {
        f.set_working_channel(CurveChannel::Red);
        f.working_curve_mut().set_knots(
            Knots::new(vec![Knot::new(0.0, 0.2), Knot::new(0.5, 0.8), Knot::new(1.0, 1.0)])
                .unwrap(),
        );
    })
    .unwrap();
    list.edit_filter_as::<HslKeyerFilter, _>(1, |f| {
        f.set_output_mode(OutputMode::Matte);
        f.set_preblur_radius(2.0);
    })
    .unwrap();
}

#[test]
fn saved_list_reproduces_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("key.ifl");

    let mut original = list();
    configured(&mut original);
    original.set_input_image(gradient());
    let expected = run(&mut original);
    original.save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("id=tonestack.filter.curves"));
    assert!(text.contains("workingchannel=red"));
    assert!(text.contains("redknots=0.00 0.20, 0.50 0.80, 1.00 1.00"));
    assert!(text.contains("outputmode=matte"));

    let mut restored = list();
    restored.load(&path).unwrap();
    assert!(restored.stages().iter().all(|s| !s.is_broken()));
    restored.set_input_image(gradient());
    assert_eq!(*run(&mut restored), *expected);
}

#[test]
fn curves_then_keyer_matches_manual_composition() {
    let mut list = list();
    configured(&mut list);
    list.set_input_image(gradient());
    let output = run(&mut list);

    let stages: Vec<_> = (0..2)
        .map(|i| list.inspect_filter(i, |f| f.clone_filter()).unwrap())
        .collect();
    let mut manual = gradient();
    for stage in &stages {
        manual = stage.process(&manual).unwrap();
    }
    assert_eq!(*output, manual);
}

#[test]
fn bypassed_keyer_leaves_curves_output() {
    let mut list = list();
    configured(&mut list);
    list.set_input_image(gradient());
    list.set_bypass(1, true).unwrap();
    let output = run(&mut list);

    let curves = list.inspect_filter(0, |f| f.clone_filter()).unwrap();
    assert_eq!(*output, curves.process(&gradient()).unwrap());
    assert!(output.pixels().all(|p| p.0[3] == 255));
}

#[test]
fn randomized_stages_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("random.ifl");
    let mut rng = StdRng::seed_from_u64(11);

    let mut original = list();
    for i in 0..4 {
        let id = if i % 2 == 0 { CURVES_ID } else { HSL_KEYER_ID };
        original.insert_by_id(i, id).unwrap();
        original
            .edit_filter(i, |f| f.randomize_parameters(&mut rng))
            .unwrap();
    }
    original.save(&path).unwrap();

    let mut restored = list();
    restored.load(&path).unwrap();
    assert_eq!(restored.to_document(), original.to_document());
}
