// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. The .spv files are produced from GLSL by
// build.rs, this module loads them from disk at startup.

use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::fs::File;
use std::path::Path;

/// Read a compiled SPIR-V file and create a shader module from it
pub fn load_shader_module<P: AsRef<Path>>(
    device: &VulkanDevice,
    path: P,
) -> Result<vk::ShaderModule> {
    let path = path.as_ref();
    let mut file = File::open(path).with_context(|| {
        format!(
            "Failed to open shader {:?} (did the build script compile it?)",
            path
        )
    })?;

    // read_spv checks the 4-byte alignment SPIR-V requires
    let code = ash::util::read_spv(&mut file)
        .with_context(|| format!("Failed to read SPIR-V from {:?}", path))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .with_context(|| format!("Failed to create shader module from {:?}", path))
    }
}
