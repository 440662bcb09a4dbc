//! Integration tests: saving and loading filter lists through `.ifl` files.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::any::Any;
use std::sync::Arc;

use image::Rgba;
use rand::RngCore;
use tonestack_pipeline::{
    FilterError, FilterInfo, FilterList, FilterRegistry, Image, ImageFilter, ParameterStore,
    PipelineError, RunOutcome, StageAction,
};

/// Brightens every color channel by `amount`, saturating.
#[derive(Clone, Default)]
struct Brighten {
    amount: u8,
}

impl ImageFilter for Brighten {
    fn id(&self) -> &str {
        "test.brighten"
    }

    fn process(&self, image: &Image) -> Result<Image, FilterError> {
        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            for c in &mut pixel.0[..3] {
                *c = c.saturating_add(self.amount);
            }
        }
        Ok(out)
    }

    fn load_parameters(&mut self, store: &ParameterStore) -> Result<(), FilterError> {
        let raw = store.get("amount").unwrap_or("0");
        self.amount = raw
            .trim()
            .parse()
            .map_err(|_| FilterError::invalid("amount", raw, "expected 0-255"))?;
        Ok(())
    }

    fn save_parameters(&self, store: &mut ParameterStore) {
        store.set("amount", self.amount.to_string());
    }

    fn clone_filter(&self) -> Box<dyn ImageFilter> {
        Box::new(self.clone())
    }

    fn randomize_parameters(&mut self, rng: &mut dyn RngCore) {
        self.amount = rng.next_u32().to_le_bytes()[0];
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn brighten() -> Box<dyn ImageFilter> {
    Box::new(Brighten::default())
}

fn registry() -> Arc<FilterRegistry> {
    Arc::new(FilterRegistry::new().with(
        "test.brighten",
        FilterInfo::new("Brighten", "Adds a constant to RGB"),
        brighten,
    ))
}

fn list() -> FilterList {
    let mut list = FilterList::new(registry()).unwrap();
    list.set_auto_run(false);
    list
}

fn amount(list: &FilterList, index: usize) -> u8 {
    list.inspect_filter(index, |f| {
        f.as_any().downcast_ref::<Brighten>().unwrap().amount
    })
    .unwrap()
}

#[test]
fn save_then_load_restores_stages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warm.ifl");

    let mut original = list();
    original.set_name("Warm");
    original.set_description("two passes");
    original.push(Box::new(Brighten { amount: 10 }));
    original.push(Box::new(Brighten { amount: 20 }));
    original.set_bypass(1, true).unwrap();
    original.save(&path).unwrap();

    let mut restored = list();
    restored.load(&path).unwrap();
    assert_eq!(restored.name(), "Warm");
    assert_eq!(restored.description(), "two passes");
    assert_eq!(restored.len(), 2);
    assert_eq!(amount(&restored, 0), 10);
    assert_eq!(amount(&restored, 1), 20);
    assert!(restored.bypass(1).unwrap());
    assert_eq!(restored.to_document(), original.to_document());
}

#[test]
fn unknown_filter_loads_as_passthrough_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.ifl");
    std::fs::write(
        &path,
        "[info]\n\
         name=mixed\n\
         fileType=tonestack.imagefilterlist\n\
         nFilters=2\n\
         \n\
         [imageFilter1]\n\
         id=vendor.filter.sharpen\n\
         bypass=false\n\
         radius=3\n\
         \n\
         [imageFilter2]\n\
         id=test.brighten\n\
         bypass=false\n\
         amount=5\n",
    )
    .unwrap();

    let mut list = list();
    list.load(&path).unwrap();
    let stages = list.stages();
    assert!(stages[0].is_broken());
    assert_eq!(stages[0].filter_id, "vendor.filter.sharpen");
    assert!(!stages[1].is_broken());
    assert!(matches!(
        list.edit_filter(0, |_| ()),
        Err(PipelineError::BrokenStage { index: 0, .. })
    ));

    list.set_input_image(Image::from_pixel(4, 4, Rgba([100, 100, 100, 255])));
    let RunOutcome::Completed { image, diagnostics } = list.request_recompute().unwrap().wait()
    else {
        panic!("expected completion");
    };
    assert_eq!(image.get_pixel(0, 0).0, [105, 105, 105, 255]);
    assert_eq!(diagnostics.stage(0).unwrap().action, StageAction::Broken);

    // The placeholder writes its original id and parameters back.
    let resaved = dir.path().join("resaved.ifl");
    list.save(&resaved).unwrap();
    let text = std::fs::read_to_string(&resaved).unwrap();
    assert!(text.contains("id=vendor.filter.sharpen"));
    assert!(text.contains("radius=3"));
}

#[test]
fn rejected_parameters_load_as_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad-params.ifl");
    std::fs::write(
        &path,
        "[info]\nfileType=tonestack.imagefilterlist\nnFilters=1\n\
         [imageFilter1]\nid=test.brighten\namount=lots\n",
    )
    .unwrap();

    let mut list = list();
    list.load(&path).unwrap();
    let stage = list.stage(0).unwrap();
    assert!(stage.is_broken());
    assert!(stage.broken_reason.unwrap().contains("amount"));
}

#[test]
fn malformed_file_leaves_list_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ifl");
    std::fs::write(
        &path,
        "[info]\nfileType=tonestack.imagefilterlist\nnFilters=3\n[imageFilter1]\nid=test.brighten\n",
    )
    .unwrap();

    let mut list = list();
    list.set_name("keep me");
    list.push(Box::new(Brighten { amount: 1 }));
    let result = list.load(&path);
    assert!(matches!(result, Err(PipelineError::ListFile(_))));
    assert_eq!(list.len(), 1);
    assert_eq!(list.name(), "keep me");
    assert_eq!(amount(&list, 0), 1);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut list = list();
    assert!(matches!(
        list.load(dir.path().join("nope.ifl")),
        Err(PipelineError::Io(_))
    ));
}

#[test]
fn insert_by_id_uses_registry() {
    let mut list = list();
    list.insert_by_id(0, "test.brighten").unwrap();
    assert_eq!(amount(&list, 0), 0);
    assert!(matches!(
        list.insert_by_id(0, "test.nothing"),
        Err(PipelineError::UnknownFilter(_))
    ));
}
