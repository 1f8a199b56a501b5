//! Frame loop against the simulated device.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use frameflow_core::{Config, FrameClock};
use frameflow_engine::policies::HostBufferSwap;
use frameflow_engine::primitive::SwapPrimitive;
use frameflow_engine::{Context, GraphicsEngineCreateInfo, SurfaceSwapchainFactory};
use frameflow_rhi::headless::{GpuTiming, HeadlessBackend};
use frameflow_rhi::{BufferUsage, SwapchainImages, vk};

use crate::{FPS_LOG_INTERVAL, FrameUniforms};

/// Frames rendered before the headless run ends.
const HEADLESS_FRAMES: u64 = 600;

pub fn run(config: &Config) -> Result<()> {
    let backend = Arc::new(
        HeadlessBackend::universal(config.engine.queues_per_family)
            .with_timing(GpuTiming::Deferred),
    );
    let extent = vk::Extent2D {
        width: config.window.width,
        height: config.window.height,
    };
    let factory = Arc::new(SurfaceSwapchainFactory::new(
        backend.create_surface(extent),
        extent,
    ));
    let context = Context::new(backend.clone());
    let mut engine = context.create_graphics_engine(
        GraphicsEngineCreateInfo::<HeadlessBackend>::from_config(factory, &config.engine),
    )?;

    let mut uniforms = SwapPrimitive::new(
        engine.base().clone(),
        HostBufferSwap::<FrameUniforms>::new(BufferUsage::Uniform),
    );
    uniforms.reset_all(&())?;

    let mut clock = FrameClock::new();
    let mut frame_number = 0u32;
    engine.run(
        |frame| {
            frame_number += 1;
            let extent = frame.swapchain().extent();
            uniforms.write(
                frame.slot(),
                FrameUniforms {
                    time: frame_number as f32 / 60.0,
                    frame: frame_number,
                    extent: [extent.width, extent.height],
                },
            )?;
            if let Some(cell) = uniforms.get(frame.slot_index()) {
                frame.use_primitive(&cell);
            }
            Ok(())
        },
        || {
            clock.tick();
            if clock.frames().is_multiple_of(FPS_LOG_INTERVAL) {
                info!("{:.1} FPS", clock.fps());
            }
            clock.frames() <= HEADLESS_FRAMES
        },
    )?;

    info!(
        "Headless run finished: {} frames, {} submissions pending",
        frame_number,
        backend.pending_submissions()
    );
    Ok(())
}
