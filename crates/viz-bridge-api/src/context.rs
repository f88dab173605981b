//! Render context: the drawing surface a component paints into.

use crate::color::{Color, Gradient};
use crate::command::{BlendMode, Font, RenderCommand, TextAlign};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Component-supplied shader with an optional compute pass.
///
/// The cache key defaults to a hash of the source so edited shaders
/// recompile while unchanged ones reuse the host's compiled pipeline.
#[derive(Clone, Debug)]
pub struct CustomShader {
    pub fragment_source: String,
    pub compute_source: Option<String>,
    pub buffer_size: u32,
    pub num_groups: (u32, u32, u32),
    pub cache_key: Option<String>,
    pub uniforms: BTreeMap<String, f32>,
}

impl CustomShader {
    pub fn new(fragment_source: impl Into<String>) -> Self {
        Self {
            fragment_source: fragment_source.into(),
            compute_source: None,
            buffer_size: 4096,
            num_groups: (1, 1, 1),
            cache_key: None,
            uniforms: BTreeMap::new(),
        }
    }

    pub fn with_compute(mut self, source: impl Into<String>) -> Self {
        self.compute_source = Some(source.into());
        self
    }

    pub fn with_buffer_size(mut self, size: u32) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_num_groups(mut self, x: u32, y: u32, z: u32) -> Self {
        self.num_groups = (x, y, z);
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_uniform(mut self, name: impl Into<String>, value: f32) -> Self {
        self.uniforms.insert(name.into(), value);
        self
    }

    fn resolve_cache_key(&self) -> String {
        if let Some(key) = &self.cache_key {
            return key.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.fragment_source.as_bytes());
        if let Some(compute) = &self.compute_source {
            hasher.update(compute.as_bytes());
        }
        format!("_custom_{:x}", hasher.finalize())
    }
}

/// Accumulates one frame's command buffer.
///
/// `width`/`height` reflect the component's current on-canvas size; each
/// drawing method appends a single [`RenderCommand`].
#[derive(Debug)]
pub struct RenderContext {
    pub width: f32,
    pub height: f32,
    commands: Vec<RenderCommand>,
}

impl RenderContext {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    /// Drain the accumulated buffer, leaving the context empty for reuse.
    pub fn take_commands(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn clear(&mut self, color: Color) {
        self.commands.push(RenderCommand::Clear { color });
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        self.commands.push(RenderCommand::FillRect { x, y, w, h, color });
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color, thickness: f32) {
        self.commands.push(RenderCommand::StrokeRect {
            x,
            y,
            w,
            h,
            color,
            thickness,
        });
    }

    pub fn fill_rounded_rect(&mut self, x: f32, y: f32, w: f32, h: f32, radius: f32, color: Color) {
        self.commands.push(RenderCommand::FillRoundedRect {
            x,
            y,
            w,
            h,
            radius,
            color,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn stroke_rounded_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        radius: f32,
        color: Color,
        thickness: f32,
    ) {
        self.commands.push(RenderCommand::StrokeRoundedRect {
            x,
            y,
            w,
            h,
            radius,
            color,
            thickness,
        });
    }

    pub fn fill_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, color: Color) {
        self.commands.push(RenderCommand::FillEllipse { cx, cy, rx, ry, color });
    }

    pub fn stroke_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, color: Color, thickness: f32) {
        self.commands.push(RenderCommand::StrokeEllipse {
            cx,
            cy,
            rx,
            ry,
            color,
            thickness,
        });
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color) {
        self.commands.push(RenderCommand::FillCircle { cx, cy, radius, color });
    }

    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color, thickness: f32) {
        self.commands.push(RenderCommand::StrokeCircle {
            cx,
            cy,
            radius,
            color,
            thickness,
        });
    }

    pub fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: Color, thickness: f32) {
        self.commands.push(RenderCommand::DrawLine {
            x1,
            y1,
            x2,
            y2,
            color,
            thickness,
        });
    }

    pub fn draw_path(&mut self, points: Vec<(f32, f32)>, color: Color, thickness: f32, closed: bool) {
        self.commands.push(RenderCommand::DrawPath {
            points,
            color,
            thickness,
            closed,
        });
    }

    pub fn fill_path(&mut self, points: Vec<(f32, f32)>, color: Color) {
        self.commands.push(RenderCommand::FillPath { points, color });
    }

    pub fn draw_polyline(&mut self, points: Vec<(f32, f32)>, color: Color, thickness: f32) {
        self.commands.push(RenderCommand::DrawPolyline {
            points,
            color,
            thickness,
        });
    }

    /// Stroke a circular arc; `start`/`end` are radians, 0 at 3 o'clock.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_arc(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        start: f32,
        end: f32,
        color: Color,
        thickness: f32,
    ) {
        self.commands.push(RenderCommand::DrawArc {
            cx,
            cy,
            radius,
            start,
            end,
            color,
            thickness,
        });
    }

    pub fn fill_arc(&mut self, cx: f32, cy: f32, radius: f32, start: f32, end: f32, color: Color) {
        self.commands.push(RenderCommand::FillArc {
            cx,
            cy,
            radius,
            start,
            end,
            color,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_bezier(
        &mut self,
        x1: f32,
        y1: f32,
        cx1: f32,
        cy1: f32,
        cx2: f32,
        cy2: f32,
        x2: f32,
        y2: f32,
        color: Color,
        thickness: f32,
    ) {
        self.commands.push(RenderCommand::DrawBezier {
            x1,
            y1,
            cx1,
            cy1,
            cx2,
            cy2,
            x2,
            y2,
            color,
            thickness,
        });
    }

    /// Lay out text inside the `(x, y, w, h)` rectangle.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_text(
        &mut self,
        text: impl Into<String>,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Color,
        font: Font,
        align: TextAlign,
    ) {
        self.commands.push(RenderCommand::DrawText {
            text: text.into(),
            x,
            y,
            w,
            h,
            color,
            font,
            align,
        });
    }

    /// Center `text` in the full component rectangle.
    pub fn draw_centered_text(&mut self, text: impl Into<String>, color: Color, font: Font) {
        let h = font.size * 1.5;
        let y = (self.height - h) / 2.0;
        self.draw_text(text, 0.0, y, self.width, h, color, font, TextAlign::Center);
    }

    pub fn draw_image(&mut self, key: impl Into<String>, x: f32, y: f32, w: f32, h: f32, opacity: f32) {
        self.commands.push(RenderCommand::DrawImage {
            key: key.into(),
            x,
            y,
            w,
            h,
            opacity,
        });
    }

    pub fn fill_gradient_rect(&mut self, x: f32, y: f32, w: f32, h: f32, gradient: Gradient) {
        self.commands.push(RenderCommand::FillGradientRect {
            x,
            y,
            w,
            h,
            gradient,
        });
    }

    pub fn set_clip(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.commands.push(RenderCommand::SetClip { x, y, w, h });
    }

    pub fn reset_clip(&mut self) {
        self.commands.push(RenderCommand::ResetClip);
    }

    pub fn push_transform(
        &mut self,
        translate: Option<(f32, f32)>,
        rotate: Option<f32>,
        scale: Option<(f32, f32)>,
    ) {
        self.commands.push(RenderCommand::PushTransform {
            translate,
            rotate,
            scale,
        });
    }

    pub fn pop_transform(&mut self) {
        self.commands.push(RenderCommand::PopTransform);
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.commands.push(RenderCommand::SetOpacity { opacity });
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.commands.push(RenderCommand::SetBlendMode { mode });
    }

    pub fn save_state(&mut self) {
        self.commands.push(RenderCommand::SaveState);
    }

    pub fn restore_state(&mut self) {
        self.commands.push(RenderCommand::RestoreState);
    }

    /// Run a host built-in shader effect over the component rectangle.
    pub fn draw_shader(&mut self, shader_id: impl Into<String>, uniforms: BTreeMap<String, f32>) {
        self.commands.push(RenderCommand::DrawShader {
            shader_id: shader_id.into(),
            uniforms,
        });
    }

    pub fn draw_custom_shader(&mut self, shader: CustomShader) {
        let cache_key = shader.resolve_cache_key();
        self.commands.push(RenderCommand::DrawCustomShader {
            cache_key,
            fragment_source: shader.fragment_source,
            compute_source: shader.compute_source,
            buffer_size: shader.buffer_size,
            num_groups_x: shader.num_groups.0,
            num_groups_y: shader.num_groups.1,
            num_groups_z: shader.num_groups.2,
            uniforms: shader.uniforms,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_commands_drains_buffer() {
        let mut ctx = RenderContext::new(300.0, 200.0);
        ctx.clear(Color::BLACK);
        ctx.fill_rect(0.0, 0.0, 10.0, 10.0, Color::RED);
        assert_eq!(ctx.commands().len(), 2);
        let cmds = ctx.take_commands();
        assert_eq!(cmds.len(), 2);
        assert!(ctx.commands().is_empty());
    }

    #[test]
    fn centered_text_spans_component_width() {
        let mut ctx = RenderContext::new(200.0, 100.0);
        ctx.draw_centered_text("hi", Color::WHITE, Font::default());
        match &ctx.commands()[0] {
            RenderCommand::DrawText { x, w, align, .. } => {
                assert_eq!(*x, 0.0);
                assert_eq!(*w, 200.0);
                assert_eq!(*align, TextAlign::Center);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn custom_shader_cache_key_tracks_source() {
        let a = CustomShader::new("frag_a").resolve_cache_key();
        let b = CustomShader::new("frag_b").resolve_cache_key();
        let a2 = CustomShader::new("frag_a").resolve_cache_key();
        assert_ne!(a, b);
        assert_eq!(a, a2);
        assert!(a.starts_with("_custom_"));

        let explicit = CustomShader::new("frag_a")
            .with_cache_key("my_key")
            .resolve_cache_key();
        assert_eq!(explicit, "my_key");
    }

    #[test]
    fn compute_source_changes_cache_key() {
        let plain = CustomShader::new("frag").resolve_cache_key();
        let compute = CustomShader::new("frag")
            .with_compute("comp")
            .resolve_cache_key();
        assert_ne!(plain, compute);
    }
}
