// Triangle element
//
// Three hardcoded vertices, one device-local vertex buffer, one pipeline.
// The upload happens once during initialization and is fence-synchronized,
// so the buffer is complete before the first draw is recorded.

use anyhow::{Context, Result};
use ash::vk;
use glam::Vec3;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::buffer::{self, Buffer};
use crate::backend::pipeline::{GraphicsPipeline, PipelineDesc};
use crate::backend::VulkanDevice;
use crate::composition::{Element, InitContext, RebuildContext, RenderContext};

const VERTEX_SHADER: &str = "shaders/basic.vert";
const FRAGMENT_SHADER: &str = "shaders/basic.frag";

/// The demo geometry: one triangle in object space.
const TRIANGLE_VERTICES: [Vec3; 3] = [
    Vec3::new(0.0, -0.5, 1.0),
    Vec3::new(0.5, 0.5, 1.0),
    Vec3::new(-0.5, 0.5, 1.0),
];

/// Vertex input layout: a single tightly packed vec3 position at location 0.
fn vertex_input() -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let binding = vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(std::mem::size_of::<Vec3>() as u32)
        .input_rate(vk::VertexInputRate::VERTEX);

    let position = vk::VertexInputAttributeDescription::default()
        .binding(0)
        .location(0)
        .format(vk::Format::R32G32B32_SFLOAT)
        .offset(0);

    (vec![binding], vec![position])
}

#[derive(Default)]
pub struct TriangleElement {
    device: Option<Arc<VulkanDevice>>,
    vertex_buffer: Option<Buffer>,
    pipeline: Option<GraphicsPipeline>,
}

impl TriangleElement {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Element for TriangleElement {
    fn name(&self) -> &str {
        "triangle"
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        // Upload the vertices; blocks until the device-side copy completed
        let vertex_buffer = buffer::upload_to_device_local(
            ctx.device,
            ctx.command_pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &TRIANGLE_VERTICES,
            "triangle vertices",
        )?;

        let (vertex_bindings, vertex_attributes) = vertex_input();
        let pipeline = GraphicsPipeline::new(
            ctx.device,
            PipelineDesc {
                vertex_shader: PathBuf::from(VERTEX_SHADER),
                fragment_shader: PathBuf::from(FRAGMENT_SHADER),
                vertex_bindings,
                vertex_attributes,
                topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                cull_mode: vk::CullModeFlags::NONE,
            },
            ctx.render_pass,
            ctx.extent,
        )?;

        // Rebuild the pipeline whenever a shader source changes on disk
        ctx.updater
            .watch_shaders(&pipeline.shader_paths())
            .context("Failed to register shaders for hot reload")?;

        self.device = Some(ctx.device.clone());
        self.vertex_buffer = Some(vertex_buffer);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<()> {
        let device = self.device.as_ref().context("Element not initialized")?;
        let pipeline = self.pipeline.as_ref().context("Pipeline not created")?;
        let vertex_buffer = self
            .vertex_buffer
            .as_ref()
            .context("Vertex buffer not created")?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: ctx.clear_color,
            },
        }];

        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(pipeline.render_pass())
            .framebuffer(ctx.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: ctx.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.device.cmd_begin_render_pass(
                ctx.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );

            device.device.cmd_bind_pipeline(
                ctx.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.handle(),
            );

            device.device.cmd_bind_vertex_buffers(
                ctx.command_buffer,
                0,
                &[vertex_buffer.buffer],
                &[0],
            );

            // One draw: 3 vertices, 1 instance, offsets 0
            device.device.cmd_draw(
                ctx.command_buffer,
                TRIANGLE_VERTICES.len() as u32,
                1,
                0,
                0,
            );

            device.device.cmd_end_render_pass(ctx.command_buffer);
        }

        Ok(())
    }

    fn rebuild(&mut self, ctx: &RebuildContext<'_>) -> Result<()> {
        // Resize and shader changes both end in the same place: a pipeline
        // built against the current extent from the current shader sources.
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.rebuild(ctx.extent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_three_vertices_with_demo_coordinates() {
        assert_eq!(TRIANGLE_VERTICES.len(), 3);
        assert_eq!(TRIANGLE_VERTICES[0], Vec3::new(0.0, -0.5, 1.0));
        assert_eq!(TRIANGLE_VERTICES[1], Vec3::new(0.5, 0.5, 1.0));
        assert_eq!(TRIANGLE_VERTICES[2], Vec3::new(-0.5, 0.5, 1.0));
    }

    #[test]
    fn vertex_layout_is_tightly_packed_vec3() {
        let (bindings, attributes) = vertex_input();

        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].stride, 12);
        assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);

        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[0].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn vertex_bytes_match_buffer_contents() {
        // The exact byte image that upload_to_device_local stages
        let bytes: &[u8] = bytemuck::cast_slice(&TRIANGLE_VERTICES);
        assert_eq!(bytes.len(), 36);

        let first_y = f32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(first_y, -0.5);
    }
}
