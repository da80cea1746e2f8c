//! Compositing Element Integration Tests
//!
//! Tests for:
//! - Frame orchestration: inputs, transforms, opacity, outputs
//! - Intermediate target reclaim across generation flips
//! - Freeze frames and persistent results
//! - Running state: enable, opacity, stable pass list
//! - Material draws, listeners and teardown

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use composure::target::texture::DEFAULT_TARGET_FORMAT;
use composure::{
    CommandRecorder, CompositeCommand, CompositingContext, CompositingElement, CompositingError,
    CompositingMaterial, CompositingPass, CompositingSettings, CopyToTargetOutput,
    HeadlessTargetFactory, InheritedTargetPool, InputPass, Name, PostProcessProxy, TargetUsage,
    Texture, TextureInput, TransformContext, TransformPass,
};

// ============================================================================
// Helpers
// ============================================================================

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn headless() -> (Rc<CompositingContext>, Rc<HeadlessTargetFactory>) {
    init_logger();
    let factory = Rc::new(HeadlessTargetFactory::new());
    let context = CompositingContext::new(factory.clone(), CompositingSettings::default());
    (context, factory)
}

fn plate() -> Texture {
    Texture::external("Plate", 1920, 1080, DEFAULT_TARGET_FORMAT)
}

type Produced = Rc<RefCell<Vec<Texture>>>;

/// Renders into a fresh pooled target on every call.
#[derive(Clone, Default)]
struct RenderInput {
    produced: Produced,
}

impl CompositingPass for RenderInput {}

impl InputPass for RenderInput {
    fn generate_input(&mut self, pool: &InheritedTargetPool) -> Option<Texture> {
        let target = pool.request_render_target(1.0)?;
        self.produced.borrow_mut().push(target.clone());
        Some(target)
    }
}

/// Writes its input into a fresh pooled target on every call.
#[derive(Clone, Default)]
struct RenderTransform {
    produced: Produced,
}

impl CompositingPass for RenderTransform {}

impl TransformPass for RenderTransform {
    fn apply_transform(
        &mut self,
        input: Option<&Texture>,
        _context: &TransformContext<'_>,
        pool: &InheritedTargetPool,
    ) -> Option<Texture> {
        input?;
        let target = pool.request_render_target(1.0)?;
        self.produced.borrow_mut().push(target.clone());
        Some(target)
    }
}

/// Returns a named earlier result instead of its input.
struct PickResult {
    name: &'static str,
}

impl CompositingPass for PickResult {}

impl TransformPass for PickResult {
    fn apply_transform(
        &mut self,
        _input: Option<&Texture>,
        context: &TransformContext<'_>,
        _pool: &InheritedTargetPool,
    ) -> Option<Texture> {
        context.lookup.find_texture(self.name)
    }
}

fn pool_tags(element: &CompositingElement, texture: &Texture) -> TargetUsage {
    element
        .current_target_pool()
        .map_or(TargetUsage::empty(), |pool| {
            pool.borrow().find_assigned_usage_tags(texture)
        })
}

fn is_assigned(element: &CompositingElement, texture: &Texture) -> bool {
    element
        .current_target_pool()
        .is_some_and(|pool| pool.borrow().is_assigned(texture))
}

// ============================================================================
// Frame Orchestration
// ============================================================================

#[test]
fn element_without_passes_reports_no_result() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Empty", &context);

    assert!(element.enqueue_rendering(false).is_none());
    assert!(element.display_texture().is_none());
    assert!(element.latest_render_result().is_none());
}

#[test]
fn latest_result_follows_the_pipeline() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let grade = RenderTransform::default();
    element.add_input_pass("Plate", TextureInput::new(Some(plate())));
    element.add_transform_pass("Grade", grade.clone());

    let result = element.enqueue_rendering(false).unwrap();

    let graded = grade.produced.borrow()[0].clone();
    assert_eq!(result, graded);
    assert_eq!(element.display_texture(), Some(&graded));
    assert_eq!(element.find_named_render_result("Self", false), Some(graded.clone()));
    assert_eq!(
        pool_tags(&element, &graded),
        TargetUsage::TRANSFORM
    );
}

#[test]
fn transforms_can_read_earlier_results_by_name() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let background = plate();
    element.add_input_pass("Background", TextureInput::new(Some(background.clone())));
    element.add_input_pass("Foreground", TextureInput::new(Some(plate())));
    element.add_transform_pass("Pick", PickResult { name: "Background" });

    let result = element.enqueue_rendering(false);
    assert_eq!(result, Some(background));
}

#[test]
fn disabled_pass_registers_an_empty_result() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let render = RenderInput::default();
    element.add_input_pass("Render", render.clone());
    element.input_pass_mut("Render").unwrap().set_enabled(false);

    assert!(element.enqueue_rendering(false).is_none());
    assert!(render.produced.borrow().is_empty());
    assert_eq!(
        element.lookup_table().find_named_pass_result("Render", false),
        Some(None)
    );
}

#[test]
fn outputs_receive_the_final_result() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let source = plate();
    let destination = Texture::external("Capture", 1920, 1080, DEFAULT_TARGET_FORMAT);
    let recorder = Rc::new(CommandRecorder::new());
    element.set_post_process_proxy(Some(recorder.clone() as Rc<dyn PostProcessProxy>));
    element.add_input_pass("Plate", TextureInput::new(Some(source.clone())));
    element.add_output_pass("Capture", CopyToTargetOutput::new(Some(destination.clone())));

    element.enqueue_rendering(false);

    let commands = recorder.take();
    assert_eq!(commands.len(), 1);
    assert!(matches!(
        &commands[0],
        CompositeCommand::Copy { source: s, target } if *s == source && *target == destination
    ));
}

// ============================================================================
// Intermediate Targets
// ============================================================================

#[test]
fn unnamed_input_target_is_reclaimed_after_transform() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let render = RenderInput::default();
    let grade = RenderTransform::default();
    element.add_input_pass("", render.clone()).set_intermediate(true);
    element.add_transform_pass("Grade", grade.clone());

    element.enqueue_rendering(false);

    let input_target = render.produced.borrow()[0].clone();
    let graded = grade.produced.borrow()[0].clone();
    assert!(!is_assigned(&element, &input_target));
    assert!(is_assigned(&element, &graded));
    assert_eq!(
        element
            .lookup_table()
            .iter()
            .filter(|(_, entry)| entry.texture.as_ref() == Some(&input_target))
            .count(),
        0
    );
}

#[test]
fn reclaimed_generation_leaves_no_live_entries() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let render = RenderInput::default();
    element.add_input_pass("Render", render.clone()).set_intermediate(true);
    element.add_transform_pass("Grade", RenderTransform::default());
    element.add_transform_pass("Regrade", RenderTransform::default());

    element.enqueue_rendering(false);

    let reclaimed = element.intermediate_generation().tag();
    let table = element.lookup_table();
    assert!(
        table
            .iter()
            .filter(|(_, entry)| entry.usage.intersects(reclaimed))
            .all(|(_, entry)| entry.texture.is_none())
    );
    assert_eq!(table.find_named_pass_result("Render", false), Some(None));
    drop(table);

    let input_target = render.produced.borrow()[0].clone();
    assert!(!pool_tags(&element, &input_target).intersects(TargetUsage::INTERMEDIATE));
}

#[test]
fn inputs_stay_visible_to_the_first_transform() -> anyhow::Result<()> {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let first = RenderInput::default();
    element.add_input_pass("First", first.clone()).set_intermediate(true);
    element.add_input_pass("Second", RenderInput::default()).set_intermediate(true);
    element.add_transform_pass("Pick", PickResult { name: "First" });

    let result = element
        .enqueue_rendering(false)
        .context("picked input should be the final result")?;
    assert_eq!(result, first.produced.borrow()[0]);
    assert!(is_assigned(&element, &result));
    assert_eq!(element.find_named_render_result("First", false), Some(result));
    Ok(())
}

#[test]
fn picked_final_result_is_not_handed_to_other_elements() -> anyhow::Result<()> {
    let (context, _) = headless();
    let mut shot = CompositingElement::new("Shot", &context);
    let first = RenderInput::default();
    let second = RenderInput::default();
    shot.add_input_pass("First", first.clone()).set_intermediate(true);
    shot.add_input_pass("Second", second.clone()).set_intermediate(true);
    shot.add_transform_pass("Pick", PickResult { name: "First" });

    let result = shot
        .enqueue_rendering(false)
        .context("picked input should be the final result")?;
    let pool = shot.render_target_pool();
    assert!(pool.borrow().is_free(&second.produced.borrow()[0]));

    let mut other = CompositingElement::new("Other", &context);
    let scratch = other
        .request_named_render_target("Scratch", 1.0, TargetUsage::TRANSFORM)
        .context("shared pool should hand out a scratch target")?;
    assert_ne!(scratch, result);
    assert_eq!(scratch, second.produced.borrow()[0]);
    assert!(is_assigned(&shot, &result));
    Ok(())
}

#[test]
fn disabling_reuse_keeps_every_pass_target() {
    let (context, _) = headless();
    context.set_settings(CompositingSettings {
        reuse_intermediate_targets: false,
        ..Default::default()
    });
    let mut element = CompositingElement::new("Shot", &context);
    let render = RenderInput::default();
    element.add_input_pass("", render.clone());
    element.add_transform_pass("Grade", RenderTransform::default());

    element.enqueue_rendering(false);

    let input_target = render.produced.borrow()[0].clone();
    assert_eq!(pool_tags(&element, &input_target), TargetUsage::INPUT);
}

// ============================================================================
// Freeze Frames
// ============================================================================

#[test]
fn frozen_request_warns_but_release_is_blocked() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    element.set_freeze_frame_mask(TargetUsage::INPUT);

    let target = element
        .request_named_render_target("Foo", 1.0, TargetUsage::INPUT)
        .unwrap();
    assert!(!element.release_owned_target(&target));
    assert!(is_assigned(&element, &target));
    assert_eq!(element.find_named_render_result("Foo", false), Some(target));
}

#[test]
fn frozen_inputs_are_not_regenerated() {
    let (context, factory) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let render = RenderInput::default();
    element.add_input_pass("Render", render.clone());

    let first = element.enqueue_rendering(false).unwrap();
    element.set_freeze_frame_mask(TargetUsage::INPUT);
    let second = element.enqueue_rendering(false).unwrap();
    let third = element.enqueue_rendering(false).unwrap();

    assert_eq!(second, first);
    assert_eq!(third, first);
    assert_eq!(render.produced.borrow().len(), 1);
    assert_eq!(factory.created(), 1);
}

#[test]
fn frozen_transforms_reuse_last_result() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let grade = RenderTransform::default();
    element.add_input_pass("Plate", TextureInput::new(Some(plate())));
    element.add_transform_pass("Grade", grade.clone());

    let first = element.enqueue_rendering(false).unwrap();
    element.set_freeze_frame_mask(TargetUsage::TRANSFORM);
    let second = element.enqueue_rendering(false).unwrap();

    assert_eq!(second, first);
    assert_eq!(grade.produced.borrow().len(), 1);
}

#[test]
fn frozen_material_draw_returns_previous_result() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let recorder = Rc::new(CommandRecorder::new());
    element.set_post_process_proxy(Some(recorder.clone() as Rc<dyn PostProcessProxy>));
    let material = CompositingMaterial::new("Comp");

    let drawn = element
        .render_compositing_material(&material, 1.0, "Comp", TargetUsage::TRANSFORM)
        .unwrap();
    assert_eq!(recorder.take().len(), 1);

    element.set_freeze_frame_mask(TargetUsage::TRANSFORM);
    let frozen = element.render_compositing_material(&material, 1.0, "Comp", TargetUsage::TRANSFORM);
    assert_eq!(frozen, Some(drawn));
    assert!(recorder.is_empty());
}

// ============================================================================
// Persistent Results
// ============================================================================

#[test]
fn persistent_entry_rejects_a_different_texture() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let held = element
        .request_named_render_target("Hold", 1.0, TargetUsage::PERSISTENT)
        .unwrap();

    let err = element
        .register_tagged_pass_result(Some(Name::new("Hold")), Some(&plate()), TargetUsage::TRANSFORM)
        .unwrap_err();
    assert!(matches!(err, CompositingError::PersistentConflict(_)));
    element.register_pass_result("Hold", Some(&plate()), false);

    assert_eq!(element.find_named_render_result("Hold", false), Some(held));
}

#[test]
fn persistent_target_survives_frames_until_released() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    element.add_input_pass("Plate", TextureInput::new(Some(plate())));
    let held = element
        .request_named_render_target("Hold", 0.5, TargetUsage::PERSISTENT)
        .unwrap();

    element.enqueue_rendering(false);
    element.enqueue_rendering(false);
    assert!(is_assigned(&element, &held));
    assert_eq!(element.find_named_render_result("Hold", false), Some(held.clone()));

    let again = element.request_named_render_target("Hold", 0.5, TargetUsage::PERSISTENT);
    assert_eq!(again, Some(held.clone()));

    assert!(element.release_owned_target(&held));
    assert!(!is_assigned(&element, &held));
    assert!(element.find_named_render_result("Hold", false).is_none());
}

// ============================================================================
// Opacity & Running State
// ============================================================================

#[test]
fn alpha_pass_lives_only_while_translucent() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let recorder = Rc::new(CommandRecorder::new());
    element.set_post_process_proxy(Some(recorder.clone() as Rc<dyn PostProcessProxy>));
    let source = plate();
    element.add_input_pass("Plate", TextureInput::new(Some(source.clone())));

    assert_eq!(element.enqueue_rendering(false), Some(source.clone()));
    assert!(!element.has_alpha_pass());

    element.set_opacity(0.5);
    let blended = element.enqueue_rendering(false).unwrap();
    assert!(element.has_alpha_pass());
    assert_ne!(blended, source);
    let commands = recorder.take();
    assert_eq!(commands.len(), 1);
    assert!(matches!(
        &commands[0],
        CompositeCommand::ScaleAlpha { alpha, .. } if (*alpha - 0.5).abs() < f32::EPSILON
    ));

    element.set_opacity(1.0);
    assert_eq!(element.enqueue_rendering(false), Some(source));
    assert!(!element.has_alpha_pass());
    assert!(recorder.is_empty());
}

#[test]
fn zero_opacity_stops_active_rendering() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    assert!(element.is_actively_running());

    element.set_opacity(0.0);
    assert!(!element.is_actively_running());

    context.set_settings(CompositingSettings {
        disable_element_when_opacity_zero: false,
        ..Default::default()
    });
    assert!(element.is_actively_running());

    element.set_auto_run(false);
    assert!(!element.is_actively_running());
}

#[test]
fn disabling_drops_results_but_keeps_persistent_targets() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let render = RenderInput::default();
    element.add_input_pass("Render", render.clone());
    let held = element
        .request_named_render_target("Hold", 1.0, TargetUsage::PERSISTENT)
        .unwrap();
    element.enqueue_rendering(false);
    element.set_freeze_frame_mask(TargetUsage::INPUT);

    element.set_enabled(false);

    let rendered = render.produced.borrow()[0].clone();
    assert!(element.display_texture().is_none());
    assert!(element.freeze_frame_mask().is_empty());
    assert!(!is_assigned(&element, &rendered));
    assert!(is_assigned(&element, &held));
    assert_eq!(
        element.lookup_table().find_named_pass_result("Render", false),
        Some(None)
    );
}

#[test]
fn unstable_pass_list_skips_constructed_passes() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let authored = RenderTransform::default();
    let constructed = RenderTransform::default();
    element.add_input_pass("Plate", TextureInput::new(Some(plate())));
    element.add_transform_pass("Authored", authored.clone());
    element.add_new_transform_pass("Constructed", constructed.clone());

    element.enqueue_rendering(false);
    assert_eq!(authored.produced.borrow().len(), 1);
    assert_eq!(constructed.produced.borrow().len(), 1);

    context.set_settings(CompositingSettings {
        use_stable_pass_list: false,
        ..Default::default()
    });
    let result = element.enqueue_rendering(false);
    assert_eq!(authored.produced.borrow().len(), 2);
    assert_eq!(constructed.produced.borrow().len(), 1);
    assert_eq!(result, Some(authored.produced.borrow()[1].clone()));
}

#[test]
fn removed_pass_no_longer_runs() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let grade = RenderTransform::default();
    element.add_input_pass("Plate", TextureInput::new(Some(plate())));
    element.add_transform_pass("Grade", grade.clone());

    assert!(element.find_transform_pass("Grade").is_some());
    assert!(element.remove_pass("Grade"));
    assert!(!element.remove_pass("Grade"));

    element.enqueue_rendering(false);
    assert!(grade.produced.borrow().is_empty());
}

// ============================================================================
// Materials, Listeners & Teardown
// ============================================================================

#[test]
fn material_draw_binds_named_results() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let recorder = Rc::new(CommandRecorder::new());
    element.set_post_process_proxy(Some(recorder.clone() as Rc<dyn PostProcessProxy>));
    let source = plate();
    element.add_input_pass("Plate", TextureInput::new(Some(source.clone())));
    element.enqueue_rendering(false);

    let material = CompositingMaterial::new("Over")
        .with_texture_param("Foreground", "Plate")
        .with_texture_param("Background", "Missing");
    let drawn = element
        .render_compositing_material(&material, 1.0, "Over", TargetUsage::TRANSFORM)
        .unwrap();

    let commands = recorder.take();
    assert_eq!(commands.len(), 1);
    let CompositeCommand::Material { material, inputs, target } = &commands[0] else {
        panic!("expected a material draw");
    };
    assert_eq!(material.as_str(), "Over");
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0], (Name::new("Foreground"), source));
    assert_eq!(*target, drawn);
    assert_eq!(element.latest_render_result(), Some(drawn));
}

#[test]
fn listeners_observe_pass_and_final_results() {
    let (context, _) = headless();
    let mut element = CompositingElement::new("Shot", &context);
    let source = plate();
    element.add_input_pass("Plate", TextureInput::new(Some(source.clone())));

    let finals: Rc<RefCell<Vec<Option<Texture>>>> = Rc::default();
    let passes: Rc<RefCell<Vec<Option<Name>>>> = Rc::default();
    {
        let finals = finals.clone();
        element.on_final_pass_rendered(move |_, result| finals.borrow_mut().push(result.cloned()));
    }
    {
        let passes = passes.clone();
        element.on_pass_rendered(move |_, _, pass| passes.borrow_mut().push(pass));
    }

    element.enqueue_rendering(false);

    assert_eq!(*finals.borrow(), vec![Some(source)]);
    assert_eq!(*passes.borrow(), vec![Some(Name::new("Plate"))]);
}

#[test]
fn dropping_element_returns_its_targets() {
    let (context, _) = headless();
    let shared = context.shared_target_pool();
    let mut element = CompositingElement::new("Shot", &context);
    element.add_input_pass("Render", RenderInput::default());
    element
        .request_named_render_target("Hold", 1.0, TargetUsage::PERSISTENT)
        .unwrap();
    element.enqueue_rendering(false);
    assert_eq!(shared.borrow().assigned_count(), 2);

    drop(element);
    assert_eq!(shared.borrow().assigned_count(), 0);
    assert_eq!(shared.borrow().free_count(), 2);
}

#[test]
fn private_pool_is_not_shared() {
    let (context, _) = headless();
    let mut a = CompositingElement::new("A", &context);
    let mut b = CompositingElement::new("B", &context);
    b.set_use_shared_target_pool(false);

    let pool_a = a.render_target_pool();
    let pool_b = b.render_target_pool();
    assert!(!Rc::ptr_eq(&pool_a, &pool_b));
    assert!(context.live_shared_pool().is_some_and(|p| Rc::ptr_eq(&p, &pool_a)));
}
