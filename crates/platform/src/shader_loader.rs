//! SPIR-V shader modules loaded from a directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use frameflow_core::ShaderConfig;
use frameflow_engine::{EngineError, EngineResult, ShaderFactory};
use frameflow_rhi::Backend;
use frameflow_rhi::shader::read_spirv_file;

/// Loads `<directory>/<name>.spv` on first request and caches the module.
pub struct ShaderLoader<B: Backend> {
    device: Arc<B>,
    directory: PathBuf,
    cache: Mutex<HashMap<String, Arc<B::ShaderModule>>>,
}

impl<B: Backend> ShaderLoader<B> {
    pub fn new(device: Arc<B>, directory: impl Into<PathBuf>) -> Self {
        Self {
            device,
            directory: directory.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(device: Arc<B>, config: &ShaderConfig) -> Self {
        Self::new(device, &config.directory)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File a module name resolves to. Names without an extension get `.spv`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let path = self.directory.join(name);
        if path.extension().is_some() {
            path
        } else {
            path.with_extension("spv")
        }
    }

    /// Number of modules loaded so far.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<B: Backend> ShaderFactory<B> for ShaderLoader<B> {
    fn get_module(&self, name: &str) -> EngineResult<Arc<B::ShaderModule>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = cache.get(name) {
            return Ok(module.clone());
        }

        let path = self.path_for(name);
        let code = read_spirv_file(&path)
            .map_err(|e| EngineError::Shader(format!("shader '{}': {}", name, e)))?;
        let module = Arc::new(self.device.create_shader_module(&code)?);
        tracing::debug!("Loaded shader '{}' ({} words)", name, code.len());

        cache.insert(name.to_string(), module.clone());
        Ok(module)
    }
}
