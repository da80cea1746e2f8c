//! Compositing Graph Integration Tests
//!
//! Tests for:
//! - Render ordering by priority
//! - Resolution, format and camera inheritance reaching passes
//! - Frame dispatch switches
//! - Idle sweep across shared and private pools

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use composure::target::texture::DEFAULT_TARGET_FORMAT;
use composure::{
    CameraSource, CompositingContext, CompositingElement, CompositingGraph, CompositingPass,
    CompositingSettings, ElementKey, HeadlessTargetFactory, Inheritable, InheritedTargetPool,
    InputPass, Name, SceneCamera, Texture, TextureInput, TransformContext, TransformPass,
};
use glam::{IVec2, UVec2};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn graph_with(settings: CompositingSettings) -> (CompositingGraph, Rc<HeadlessTargetFactory>) {
    init_logger();
    let factory = Rc::new(HeadlessTargetFactory::new());
    let context = CompositingContext::new(factory.clone(), settings);
    (CompositingGraph::new(context), factory)
}

fn element(graph: &CompositingGraph, key: ElementKey) -> anyhow::Result<&CompositingElement> {
    graph.element(key).context("element should be in the graph")
}

fn element_mut(
    graph: &mut CompositingGraph,
    key: ElementKey,
) -> anyhow::Result<&mut CompositingElement> {
    graph.element_mut(key).context("element should be in the graph")
}

fn plate() -> Texture {
    Texture::external("Plate", 1920, 1080, DEFAULT_TARGET_FORMAT)
}

/// Renders at the element's native size and records what it got.
#[derive(Clone, Default)]
struct NativeInput {
    produced: Rc<RefCell<Vec<Texture>>>,
}

impl CompositingPass for NativeInput {}

impl InputPass for NativeInput {
    fn generate_input(&mut self, pool: &InheritedTargetPool) -> Option<Texture> {
        let target = pool.request_render_target(1.0)?;
        self.produced.borrow_mut().push(target.clone());
        Some(target)
    }
}

/// Records the camera each frame ran with.
#[derive(Clone, Default)]
struct CameraProbe {
    seen: Rc<RefCell<Vec<Option<Name>>>>,
}

impl CompositingPass for CameraProbe {}

impl TransformPass for CameraProbe {
    fn apply_transform(
        &mut self,
        input: Option<&Texture>,
        context: &TransformContext<'_>,
        _pool: &InheritedTargetPool,
    ) -> Option<Texture> {
        self.seen
            .borrow_mut()
            .push(context.camera.map(|camera| camera.name));
        input.cloned()
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn parents_render_before_children() -> anyhow::Result<()> {
    let (mut graph, _) = graph_with(CompositingSettings::default());
    let child = graph.create_element("Child");
    let parent = graph.create_element("Parent");
    assert!(graph.attach_as_child_layer(parent, child)?);

    let order: Rc<RefCell<Vec<Name>>> = Rc::default();
    for key in [child, parent] {
        let order = order.clone();
        element_mut(&mut graph, key)?
            .on_final_pass_rendered(move |name, _| order.borrow_mut().push(name));
    }

    assert_eq!(graph.render_frame(false), 2);
    assert_eq!(*order.borrow(), vec![Name::new("Parent"), Name::new("Child")]);
    assert_eq!(element(&graph, parent)?.render_priority(), 101);
    assert_eq!(element(&graph, child)?.render_priority(), 102);
    Ok(())
}

#[test]
fn inactive_elements_are_skipped() -> anyhow::Result<()> {
    let (mut graph, _) = graph_with(CompositingSettings::default());
    let running = graph.create_element("Running");
    let paused = graph.create_element("Paused");
    let hidden = graph.create_element("Hidden");
    element_mut(&mut graph, paused)?.set_auto_run(false);
    element_mut(&mut graph, hidden)?.set_opacity(0.0);

    assert_eq!(graph.render_frame(false), 1);
    assert!(element(&graph, running)?.is_actively_running());
    Ok(())
}

#[test]
fn render_shunt_stops_every_element() -> anyhow::Result<()> {
    let (mut graph, _) = graph_with(CompositingSettings {
        disable_active_rendering: true,
        ..Default::default()
    });
    let key = graph.create_element("Shot");
    element_mut(&mut graph, key)?.add_input_pass("Plate", TextureInput::new(Some(plate())));

    assert_eq!(graph.render_frame(false), 0);
    assert!(element(&graph, key)?.display_texture().is_none());
    Ok(())
}

// ============================================================================
// Inheritance
// ============================================================================

#[test]
fn child_passes_render_at_inherited_resolution() -> anyhow::Result<()> {
    let (mut graph, _) = graph_with(CompositingSettings::default());
    let parent = graph.create_element("Parent");
    let child = graph.create_child_element("Child", parent)?;
    element_mut(&mut graph, parent)?
        .set_resolution_source(Inheritable::Override(IVec2::new(1280, 720)));
    element_mut(&mut graph, parent)?
        .set_format_source(Inheritable::Override(wgpu::TextureFormat::Rgba8Unorm));

    let input = NativeInput::default();
    element_mut(&mut graph, child)?.add_input_pass("Render", input.clone());
    graph.render_frame(false);

    let produced = input.produced.borrow()[0].clone();
    assert_eq!(produced.resolution(), UVec2::new(1280, 720));
    assert_eq!(produced.format(), wgpu::TextureFormat::Rgba8Unorm);
    Ok(())
}

#[test]
fn root_without_override_uses_defaults() -> anyhow::Result<()> {
    let (mut graph, _) = graph_with(CompositingSettings::default());
    let root = graph.create_element("Root");
    let input = NativeInput::default();
    element_mut(&mut graph, root)?.add_input_pass("Render", input.clone());

    graph.render_frame(false);

    let produced = input.produced.borrow()[0].clone();
    assert_eq!(produced.resolution(), UVec2::new(1920, 1080));
    assert_eq!(produced.format(), DEFAULT_TARGET_FORMAT);
    Ok(())
}

#[test]
fn transforms_see_the_resolved_camera() -> anyhow::Result<()> {
    let (mut graph, _) = graph_with(CompositingSettings::default());
    let root = graph.create_element("Root");
    let child = graph.create_child_element("Child", root)?;
    let witness = graph.add_camera(SceneCamera::standard("Witness"));
    let hero = graph.add_camera(SceneCamera::cine("Hero"));

    let probe = CameraProbe::default();
    {
        let element = element_mut(&mut graph, child)?;
        element.add_input_pass("Plate", TextureInput::new(Some(plate())));
        element.add_transform_pass("Probe", probe.clone());
    }

    graph.render_frame(false);
    element_mut(&mut graph, root)?.set_camera_actor(Some(witness));
    graph.render_frame(false);
    element_mut(&mut graph, child)?.set_camera_source(CameraSource::Override);
    element_mut(&mut graph, child)?.set_camera_actor(Some(hero));
    graph
        .camera_mut(hero)
        .context("camera should be in the graph")?
        .mark_pending_kill();
    graph.render_frame(false);
    graph.remove_camera(hero);
    graph.render_frame(false);

    assert_eq!(
        *probe.seen.borrow(),
        vec![
            Some(Name::new("Hero")),
            Some(Name::new("Witness")),
            Some(Name::new("Hero")),
            None,
        ]
    );
    Ok(())
}

#[test]
fn renamed_child_is_found_under_new_name() -> anyhow::Result<()> {
    let (mut graph, _) = graph_with(CompositingSettings::default());
    let parent = graph.create_element("P");
    let child = graph.create_child_element("C", parent)?;
    element_mut(&mut graph, child)?.add_input_pass("Glow", TextureInput::new(Some(plate())));
    element_mut(&mut graph, child)?.set_comp_id_name("Fx");

    // Children render after their parent, so the parent reads the child's
    // results once both have run.
    graph.render_frame(false);

    let parent = element(&graph, parent)?;
    assert!(parent.find_named_render_result("Fx.Glow", true).is_some());
    assert!(parent.find_named_render_result("C.Glow", true).is_none());
    assert_eq!(parent.lookup_table().linked_table_names(), vec![Name::new("Fx")]);
    Ok(())
}

// ============================================================================
// Idle Sweep
// ============================================================================

#[test]
fn tick_sweeps_shared_and_private_pools() -> anyhow::Result<()> {
    let (mut graph, factory) = graph_with(CompositingSettings {
        stale_frame_threshold: 0,
        ..Default::default()
    });
    let shared = graph.create_element("Shared");
    let private = graph.create_element("Private");
    element_mut(&mut graph, private)?.set_use_shared_target_pool(false);
    for key in [shared, private] {
        element_mut(&mut graph, key)?.add_input_pass("Render", NativeInput::default());
    }

    graph.render_frame(false);
    assert_eq!(factory.created(), 2);
    assert_eq!(graph.tick(), 0);

    for key in [shared, private] {
        element_mut(&mut graph, key)?.set_enabled(false);
    }
    assert_eq!(graph.tick(), 2);
    assert_eq!(factory.live(), 0);
    Ok(())
}

#[test]
fn removing_an_element_frees_its_targets() -> anyhow::Result<()> {
    let (mut graph, _) = graph_with(CompositingSettings::default());
    let key = graph.create_element("Shot");
    element_mut(&mut graph, key)?.add_input_pass("Render", NativeInput::default());
    graph.render_frame(false);
    let pool = graph
        .context()
        .live_shared_pool()
        .context("rendering should create the shared pool")?;
    assert_eq!(pool.borrow().assigned_count(), 1);

    assert!(graph.remove_element(key));
    assert_eq!(pool.borrow().assigned_count(), 0);
    assert!(graph.is_empty());
    Ok(())
}
