//! Shader module wrapper.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::{RhiError, RhiResult};
use crate::vulkan::device::Device;

/// RAII wrapper around a `VkShaderModule`.
pub struct ShaderModule {
    device: Arc<Device>,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Creates a module from SPIR-V words.
    pub fn new(device: Arc<Device>, code: &[u32]) -> RhiResult<Self> {
        if code.is_empty() {
            return Err(RhiError::Shader("SPIR-V code is empty".to_string()));
        }
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };
        debug!("Created shader module ({} words)", code.len());
        Ok(Self { device, module })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed shader module");
    }
}
