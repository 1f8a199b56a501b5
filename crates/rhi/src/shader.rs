//! SPIR-V helpers shared by every backend.

use std::path::Path;

use tracing::debug;

use crate::error::{RhiError, RhiResult};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Converts little-endian SPIR-V bytes into code words.
///
/// The byte length must be a non-zero multiple of 4 and the module must start
/// with the SPIR-V magic number.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
        return Err(RhiError::Shader(format!(
            "SPIR-V code must be 4-byte aligned and non-empty, got {} bytes",
            bytes.len()
        )));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words[0] != SPIRV_MAGIC {
        return Err(RhiError::Shader(format!(
            "Invalid SPIR-V magic number: {:#010x}",
            words[0]
        )));
    }
    Ok(words)
}

/// Reads a SPIR-V file and converts it into code words.
pub fn read_spirv_file(path: &Path) -> RhiResult<Vec<u32>> {
    debug!("Loading SPIR-V from {:?}", path);
    let bytes = std::fs::read(path)
        .map_err(|e| RhiError::Shader(format!("Failed to read shader file {:?}: {}", path, e)))?;
    spirv_words(&bytes)
}
