// Shader module loading
//
// Shaders arrive precompiled as SPIR-V files. They are read from disk each time
// the pipeline is built and the modules are dropped once the pipeline exists.

use anyhow::{Context, Result};
use ash::vk;
use std::fs::File;
use std::path::Path;

use super::error::RendererError;

/// Read a SPIR-V binary into 32-bit words.
///
/// `ash::util::read_spv` checks the length, realigns the bytes and fixes
/// endianness from the magic number.
pub fn load_spirv<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let shader_load = |source: std::io::Error| RendererError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(shader_load)?;
    let words = ash::util::read_spv(&mut file).map_err(shader_load)?;

    log::debug!("Loaded shader {:?} ({} words)", path, words.len());
    Ok(words)
}

pub fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe {
        device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "hello-vulkan-{}-{}",
            std::process::id(),
            name
        ));
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn missing_file_is_a_shader_load_error() {
        let err = load_spirv("shaders/does-not-exist.spv").unwrap_err();
        let err = err.downcast_ref::<RendererError>().unwrap();
        assert!(matches!(err, RendererError::ShaderLoad { .. }));
    }

    #[test]
    fn truncated_binary_is_rejected() {
        let path = scratch_file("truncated.spv", &[0x03, 0x02, 0x23, 0x07, 0x00, 0x00]);
        let err = load_spirv(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            err.downcast_ref::<RendererError>(),
            Some(RendererError::ShaderLoad { .. })
        ));
    }

    #[test]
    fn well_formed_binary_reads_as_words() {
        // SPIR-V magic followed by one extra word, little endian
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        let path = scratch_file("valid.spv", &bytes);
        let words = load_spirv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }
}
