// Shader module loading
//
// Shaders are GLSL source files compiled to SPIR-V with glslc. The build
// script compiles them once; this module recompiles at runtime when the
// updater notices a source change, and loads the resulting bytecode.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::VulkanDevice;

/// SPIR-V artifact path for a GLSL source file:
/// `shaders/basic.vert` -> `shaders/basic.vert.spv`
pub fn spirv_path(source: &Path) -> PathBuf {
    let mut os = source.as_os_str().to_os_string();
    os.push(".spv");
    PathBuf::from(os)
}

/// Compile a GLSL source file to SPIR-V with glslc.
pub fn compile_glsl(source: &Path, output: &Path) -> Result<()> {
    let status = Command::new("glslc")
        .arg(source)
        .arg("-o")
        .arg(output)
        .status()
        .context("Failed to run glslc. Is the Vulkan SDK installed?")?;

    if !status.success() {
        anyhow::bail!(
            "glslc failed for {} (exit code {:?})",
            source.display(),
            status.code()
        );
    }

    log::info!("Compiled {} -> {}", source.display(), output.display());
    Ok(())
}

fn is_stale(source: &Path, artifact: &Path) -> bool {
    let Ok(artifact_meta) = std::fs::metadata(artifact) else {
        return true;
    };
    match (std::fs::metadata(source), artifact_meta.modified()) {
        (Ok(source_meta), Ok(artifact_time)) => source_meta
            .modified()
            .map(|source_time| source_time > artifact_time)
            .unwrap_or(true),
        _ => true,
    }
}

/// Load a shader from its GLSL source path, recompiling the SPIR-V artifact
/// first if it is missing or older than the source.
pub fn load_shader_module(device: &VulkanDevice, source: &Path) -> Result<vk::ShaderModule> {
    let artifact = spirv_path(source);
    if is_stale(source, &artifact) {
        compile_glsl(source, &artifact)?;
    }

    let bytes = std::fs::read(&artifact)
        .with_context(|| format!("Failed to read shader {}", artifact.display()))?;
    let code = ash::util::read_spv(&mut Cursor::new(&bytes))
        .with_context(|| format!("Invalid SPIR-V in {}", artifact.display()))?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spirv_path_appends_extension() {
        assert_eq!(
            spirv_path(Path::new("shaders/basic.vert")),
            PathBuf::from("shaders/basic.vert.spv")
        );
    }

    #[test]
    fn missing_artifact_is_stale() {
        assert!(is_stale(
            Path::new("shaders/basic.vert"),
            Path::new("shaders/does-not-exist.spv")
        ));
    }
}
