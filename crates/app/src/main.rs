//! frameflow sample application.
//!
//! Opens a window and runs the graphics frame loop: every frame clears the
//! acquired swapchain image and updates a per-slot uniform buffer. With
//! `backend = "headless"` in the configuration the same loop runs against the
//! simulated device for a fixed number of frames.

mod headless;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use bytemuck::{Pod, Zeroable};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use frameflow_core::{BackendKind, Config, FrameClock};
use frameflow_engine::policies::{HostBufferCow, HostBufferSwap};
use frameflow_engine::primitive::{Completion, CowPrimitive, SwapPrimitive};
use frameflow_engine::{
    Context, FrameOutcome, GraphicsEngine, GraphicsEngineCreateInfo, SkipReason, SwapFrame,
    SwapchainFactory,
};
use frameflow_platform::{ShaderLoader, Window, WindowAction, WindowRegistry};
use frameflow_rhi::vulkan::{Device, Instance, VulkanBackend, select_physical_device};
use frameflow_rhi::{BufferUsage, SwapchainImages, vk};

const CONFIG_PATH: &str = "frameflow.toml";

/// Frames between FPS log lines.
pub(crate) const FPS_LOG_INTERVAL: u64 = 300;

/// Frames between palette rebuilds.
const PALETTE_INTERVAL: u64 = 120;

/// Per-frame values written into the slot's uniform buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct FrameUniforms {
    pub time: f32,
    pub frame: u32,
    pub extent: [u32; 2],
}

/// Clear color shared by every slot until the next rebuild.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Palette {
    pub clear: [f32; 4],
}

impl Palette {
    /// Slowly cycling color for time `t` in seconds.
    pub fn at(t: f32) -> Self {
        Self {
            clear: [
                0.5 + 0.5 * t.sin(),
                0.5 + 0.5 * (t + 2.1).sin(),
                0.5 + 0.5 * (t + 4.2).sin(),
                1.0,
            ],
        }
    }
}

/// Engine and primitives of the single window.
struct Renderer {
    engine: GraphicsEngine<VulkanBackend>,
    uniforms: SwapPrimitive<VulkanBackend, HostBufferSwap<FrameUniforms>>,
    palette: CowPrimitive<VulkanBackend, HostBufferCow<Palette>>,
    /// Palette rebuild still running on the pool.
    palette_reset: Option<Completion>,
    clock: FrameClock,
}

impl Renderer {
    fn new(context: &Context<VulkanBackend>, window: Arc<Window>, config: &Config) -> Result<Self> {
        let info = GraphicsEngineCreateInfo::<VulkanBackend>::from_config(window, &config.engine);
        let mut engine = context.create_graphics_engine(info)?;
        engine.add_swapchain_callbacks(
            || info!("Releasing swapchain-dependent resources"),
            |swapchain| {
                let extent = swapchain.extent();
                info!("Swapchain rebuilt at {}x{}", extent.width, extent.height);
            },
        );

        let mut uniforms = SwapPrimitive::new(
            engine.base().clone(),
            HostBufferSwap::new(BufferUsage::Uniform),
        );
        uniforms.reset_all(&())?;

        let palette = CowPrimitive::new(
            engine.base().clone(),
            HostBufferCow::new(BufferUsage::Uniform),
        );
        palette.reset(Palette::at(0.0)).run()?;

        Ok(Self {
            engine,
            uniforms,
            palette,
            palette_reset: None,
            clock: FrameClock::new(),
        })
    }

    fn draw(&mut self, pool: &rayon::ThreadPool) -> Result<()> {
        let Self {
            engine,
            uniforms,
            palette,
            palette_reset,
            clock,
        } = self;

        clock.tick();
        let time = clock.elapsed().as_secs_f32();
        let frame_number = clock.frames();
        reap_reset(palette_reset);
        if frame_number.is_multiple_of(PALETTE_INTERVAL) && palette_reset.is_none() {
            // Published whenever the pool gets to it; frames keep the old one until then.
            *palette_reset = Some(palette.reset(Palette::at(time)).spawn_on(pool));
        }

        let current_palette = palette.get();
        let clear = Palette::at(time).clear;

        let outcome = engine.render_frame(|frame| {
            let extent = frame.swapchain().extent();
            uniforms.write(
                frame.slot(),
                FrameUniforms {
                    time,
                    frame: frame_number as u32,
                    extent: [extent.width, extent.height],
                },
            )?;
            if let Some(cell) = uniforms.get(frame.slot_index()) {
                frame.use_primitive(&cell);
            }
            if let Some(cell) = &current_palette {
                frame.use_primitive(cell);
            }
            record_clear(frame, clear);
            Ok(())
        })?;

        match outcome {
            FrameOutcome::Presented { .. } => {
                if frame_number.is_multiple_of(FPS_LOG_INTERVAL) {
                    info!("{:.1} FPS", clock.fps());
                }
            }
            FrameOutcome::Skipped(SkipReason::Minimized) => {}
            FrameOutcome::Skipped(reason) => warn!("Frame skipped: {:?}", reason),
        }
        Ok(())
    }
}

/// Logs the result of a finished background reset and clears it. A reset
/// still running is left in place. Returns true if one failed.
fn reap_reset(pending: &mut Option<Completion>) -> bool {
    let Some(completion) = pending.take() else {
        return false;
    };
    match completion.try_wait() {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            warn!("Palette rebuild failed: {}", e);
            true
        }
        Err(completion) => {
            *pending = Some(completion);
            false
        }
    }
}

/// Clears the acquired image and leaves it ready for presentation.
fn record_clear(frame: &SwapFrame<'_, VulkanBackend>, color: [f32; 4]) {
    let commands = frame.commands();
    let image = frame.swapchain().image(frame.image_index());

    commands.transition_color_image(
        image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::empty(),
        ),
        (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ),
    );
    commands.clear_color_image(
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &vk::ClearColorValue { float32: color },
    );
    commands.transition_color_image(
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
        (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        (
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::AccessFlags::empty(),
        ),
    );
}

struct App {
    config: Config,
    pool: rayon::ThreadPool,
    // Field order is drop order: engine, then windows and their surfaces,
    // then the instance.
    renderer: Option<Renderer>,
    windows: WindowRegistry,
    instance: Option<Arc<Instance>>,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .thread_name(|i| format!("frameflow-worker-{}", i))
            .build()?;
        Ok(Self {
            config,
            pool,
            renderer: None,
            windows: WindowRegistry::new(),
            instance: None,
            failure: None,
        })
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let instance = Instance::new(self.config.device.validation)?;
        let window = Arc::new(Window::new(event_loop, &instance, &self.config.window)?);
        self.windows.insert(window.clone());

        let physical = select_physical_device(&instance, Some(window.surface()))?;
        let device = Device::new(&instance, &physical, self.config.engine.queues_per_family)?;
        let backend = Arc::new(VulkanBackend::new(device));
        let shaders = Arc::new(ShaderLoader::from_config(backend.clone(), &self.config.shaders));
        let context = Context::with_shader_factory(backend, shaders);

        self.renderer = Some(Renderer::new(&context, window, &self.config)?);
        self.instance = Some(instance);
        info!("Initialization complete, entering main loop");
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{:#}", e);
        self.renderer = None;
        self.failure = Some(e);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_none()
            && self.failure.is_none()
            && let Err(e) = self.init(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match self.windows.handle_event(id, &event) {
            WindowAction::Closed => {
                info!("Close requested, shutting down");
                self.renderer = None;
                event_loop.exit();
            }
            WindowAction::Redraw => {
                if let Some(renderer) = self.renderer.as_mut()
                    && let Err(e) = renderer.draw(&self.pool)
                {
                    self.fail(event_loop, e);
                }
            }
            WindowAction::None => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        for window in self.windows.iter() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&path).with_context(|| format!("loading {}", path))?;
    config.validate()?;

    frameflow_core::init_logging_with(&config.logging.filter);
    info!("Starting frameflow ({:?} backend)", config.device.backend);

    match config.device.backend {
        BackendKind::Headless => headless::run(&config),
        BackendKind::Vulkan => {
            let event_loop = EventLoop::new()?;
            event_loop.set_control_flow(ControlFlow::Poll);

            let mut app = App::new(config)?;
            event_loop.run_app(&mut app)?;
            match app.failure.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frameflow_engine::EngineError;

    #[test]
    fn test_reap_reset_reports_failure_once() {
        let (signal, completion) = Completion::channel();
        let mut pending = Some(completion);
        assert!(!reap_reset(&mut pending));
        assert!(pending.is_some());

        signal.finish(Err(EngineError::Primitive("out of memory".to_string())));
        assert!(reap_reset(&mut pending));
        assert!(pending.is_none());
        assert!(!reap_reset(&mut pending));
    }

    #[test]
    fn test_reap_reset_clears_success() {
        let mut pending = Some(Completion::ready());
        assert!(!reap_reset(&mut pending));
        assert!(pending.is_none());
    }
}
