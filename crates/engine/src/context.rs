//! Shared root object of the engine layer.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frameflow_rhi::{Backend, QueueCaps};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::factory::ShaderFactory;
use crate::graphics::{GraphicsEngine, GraphicsEngineCreateInfo};
use crate::queue::{Queue, QueueSharing};
use crate::registry::QueueRegistry;

struct ContextInner<B: Backend> {
    device: Arc<B>,
    shaders: Option<Arc<dyn ShaderFactory<B>>>,
    registry: Mutex<QueueRegistry<B>>,
}

/// Device, shader factory and queue registry shared by every engine.
///
/// Cloning is cheap; all clones refer to the same registry.
pub struct Context<B: Backend> {
    inner: Arc<ContextInner<B>>,
}

impl<B: Backend> Clone for Context<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Backend> Context<B> {
    /// Creates a context without a shader factory.
    pub fn new(device: Arc<B>) -> Self {
        Self::build(device, None)
    }

    pub fn with_shader_factory(device: Arc<B>, shaders: Arc<dyn ShaderFactory<B>>) -> Self {
        Self::build(device, Some(shaders))
    }

    fn build(device: Arc<B>, shaders: Option<Arc<dyn ShaderFactory<B>>>) -> Self {
        let registry = QueueRegistry::new(device.queue_families().to_vec());
        debug!(
            "Context created over {} queue family(ies)",
            device.queue_families().len()
        );
        Self {
            inner: Arc::new(ContextInner {
                device,
                shaders,
                registry: Mutex::new(registry),
            }),
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<B> {
        &self.inner.device
    }

    /// Claims or shares a queue satisfying `caps`.
    pub fn allocate_queue(&self, caps: QueueCaps) -> EngineResult<Arc<Queue<B>>> {
        self.registry().allocate(&self.inner.device, caps)
    }

    /// Releases one reference obtained from [`allocate_queue`](Self::allocate_queue).
    pub fn free_queue(&self, queue: &Arc<Queue<B>>) {
        self.registry().free(queue);
    }

    /// Sharing state of a claimed queue.
    pub fn queue_sharing(&self, family: u32, index: u32) -> Option<QueueSharing> {
        self.registry().sharing(family, index)
    }

    /// Number of queues currently claimed by at least one engine.
    pub fn claimed_queue_count(&self) -> usize {
        self.registry().len()
    }

    /// Looks up a shader module through the configured factory.
    pub fn shader_module(&self, name: &str) -> EngineResult<Arc<B::ShaderModule>> {
        match &self.inner.shaders {
            Some(shaders) => shaders.get_module(name),
            None => Err(EngineError::Shader(format!(
                "no shader factory configured to load '{}'",
                name
            ))),
        }
    }

    /// Builds a graphics engine on a `{present, graphics}` queue.
    pub fn create_graphics_engine(
        &self,
        info: GraphicsEngineCreateInfo<B>,
    ) -> EngineResult<GraphicsEngine<B>> {
        GraphicsEngine::new(self, info)
    }

    // The registry is only touched at engine construction and teardown.
    fn registry(&self) -> MutexGuard<'_, QueueRegistry<B>> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: Backend> fmt::Debug for Context<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("claimed_queues", &self.claimed_queue_count())
            .field("has_shader_factory", &self.inner.shaders.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frameflow_rhi::headless::{HeadlessBackend, HeadlessShaderModule};
    use frameflow_rhi::Backend as _;

    struct OneShader(Arc<HeadlessShaderModule>);

    impl ShaderFactory<HeadlessBackend> for OneShader {
        fn get_module(&self, name: &str) -> EngineResult<Arc<HeadlessShaderModule>> {
            if name == "clear" {
                Ok(self.0.clone())
            } else {
                Err(EngineError::Shader(format!("unknown shader '{}'", name)))
            }
        }
    }

    #[test]
    fn test_shader_lookup_without_factory_fails() {
        let context = Context::new(Arc::new(HeadlessBackend::universal(1)));
        assert!(matches!(
            context.shader_module("clear"),
            Err(EngineError::Shader(_))
        ));
    }

    #[test]
    fn test_shader_lookup_through_factory() {
        let device = Arc::new(HeadlessBackend::universal(1));
        let module = Arc::new(device.create_shader_module(&[0x0723_0203]).unwrap());
        let context = Context::with_shader_factory(device, Arc::new(OneShader(module.clone())));
        let found = context.shader_module("clear").unwrap();
        assert!(Arc::ptr_eq(&found, &module));
        assert!(context.shader_module("missing").is_err());
    }

    #[test]
    fn test_clones_share_registry() {
        let context = Context::new(Arc::new(HeadlessBackend::universal(2)));
        let other = context.clone();
        let queue = context.allocate_queue(QueueCaps::PRESENT_GRAPHICS).unwrap();
        assert_eq!(other.claimed_queue_count(), 1);
        other.free_queue(&queue);
        assert_eq!(context.claimed_queue_count(), 0);
    }

    #[test]
    fn test_context_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Context<HeadlessBackend>>();
    }
}
