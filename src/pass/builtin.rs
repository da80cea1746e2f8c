//! Built-in Passes
//!
//! - [`TextureInput`]: feeds an externally produced texture into an element
//! - [`AlphaTransformPass`]: premultiplied opacity scale, used by elements
//!   whose opacity is below one
//! - [`CopyToTargetOutput`]: copies the final result to a destination texture

use glam::IVec2;

use super::proxy::{CompositeCommand, PostProcessProxy};
use super::{CompositingPass, InputPass, OutputPass, TransformContext, TransformPass};
use crate::target::inherited::InheritedTargetPool;
use crate::target::texture::Texture;

fn resolution_of(texture: &Texture) -> IVec2 {
    texture.resolution().as_ivec2()
}

// ─── TextureInput ────────────────────────────────────────────────────────────

/// Input pass returning a texture set from outside the compositor.
#[derive(Default)]
pub struct TextureInput {
    texture: Option<Texture>,
}

impl TextureInput {
    #[must_use]
    pub fn new(texture: Option<Texture>) -> Self {
        Self { texture }
    }

    pub fn set_texture(&mut self, texture: Option<Texture>) {
        self.texture = texture;
    }

    #[must_use]
    pub fn texture(&self) -> Option<&Texture> {
        self.texture.as_ref()
    }
}

impl CompositingPass for TextureInput {}

impl InputPass for TextureInput {
    fn generate_input(&mut self, _pool: &InheritedTargetPool) -> Option<Texture> {
        self.texture.clone()
    }
}

// ─── AlphaTransformPass ──────────────────────────────────────────────────────

/// Scales the input by a constant alpha.
pub struct AlphaTransformPass {
    pub alpha_scale: f32,
}

impl Default for AlphaTransformPass {
    fn default() -> Self {
        Self { alpha_scale: 1.0 }
    }
}

impl AlphaTransformPass {
    #[must_use]
    pub fn new(alpha_scale: f32) -> Self {
        Self { alpha_scale }
    }
}

impl CompositingPass for AlphaTransformPass {}

impl TransformPass for AlphaTransformPass {
    fn apply_transform(
        &mut self,
        input: Option<&Texture>,
        context: &TransformContext<'_>,
        pool: &InheritedTargetPool,
    ) -> Option<Texture> {
        let input = input?;
        if self.alpha_scale >= 1.0 {
            return Some(input.clone());
        }
        let Some(proxy) = context.post_process else {
            log::warn!("Alpha pass has no post-process proxy; passing the input through");
            return Some(input.clone());
        };
        let Some(target) = pool.request_render_target_sized(resolution_of(input), input.format())
        else {
            return Some(input.clone());
        };

        proxy.submit(CompositeCommand::ScaleAlpha {
            source: input.clone(),
            target: target.clone(),
            alpha: self.alpha_scale.max(0.0),
        });
        Some(target)
    }
}

// ─── CopyToTargetOutput ──────────────────────────────────────────────────────

/// Copies the final result into a destination texture.
///
/// Without an explicit destination a pooled, output-tagged target of the
/// result's size is used for the frame.
#[derive(Default)]
pub struct CopyToTargetOutput {
    destination: Option<Texture>,
    last_written: Option<Texture>,
}

impl CopyToTargetOutput {
    #[must_use]
    pub fn new(destination: Option<Texture>) -> Self {
        Self {
            destination,
            last_written: None,
        }
    }

    /// The texture written by the most recent relay, if any.
    #[must_use]
    pub fn last_written(&self) -> Option<&Texture> {
        self.last_written.as_ref()
    }
}

impl CompositingPass for CopyToTargetOutput {
    fn on_frame_begin(&mut self, _camera_cut: bool) {
        self.last_written = None;
    }

    fn reset(&mut self) {
        self.last_written = None;
    }
}

impl OutputPass for CopyToTargetOutput {
    fn relay_output(
        &mut self,
        result: Option<&Texture>,
        post_process: Option<&dyn PostProcessProxy>,
        pool: &InheritedTargetPool,
    ) {
        let Some(source) = result else {
            return;
        };
        let Some(proxy) = post_process else {
            log::warn!("Copy output has no post-process proxy; nothing relayed");
            return;
        };
        let target = match &self.destination {
            Some(destination) => Some(destination.clone()),
            None => pool.request_render_target_sized(resolution_of(source), source.format()),
        };
        let Some(target) = target else {
            return;
        };

        proxy.submit(CompositeCommand::Copy {
            source: source.clone(),
            target: target.clone(),
        });
        self.last_written = Some(target);
    }
}
