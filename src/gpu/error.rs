use std::fmt;

/// Errors surfaced by resource factories and command submission.
///
/// Invalid descriptor combinations are debug-asserted and then reported as
/// `InvalidInfo` so release builds fail closed instead of hitting undefined
/// native behavior.
#[derive(Debug)]
pub enum GpuError {
    /// A resource pool or ID allocator ran out of slots.
    Exhausted(&'static str),
    /// A descriptor violated a creation-time precondition.
    InvalidInfo(&'static str),
    /// A handle did not resolve in this context (stale, invalid, or from
    /// another backend instance).
    InvalidHandle(&'static str),
    /// Shader compilation or program linking failed; the per-error details
    /// were already routed through the log.
    ShaderCompile(String),
    /// The backend lacks a capability the operation requires.
    MissingCapability(&'static str),
    /// The requested backend was not compiled into this build.
    BackendUnavailable(&'static str),
    #[cfg(feature = "nori-vulkan")]
    Vulkan(ash::vk::Result),
    #[cfg(feature = "nori-vulkan")]
    VulkanLoading(ash::LoadingError),
    #[cfg(feature = "nori-gl")]
    Gl(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::Exhausted(what) => write!(f, "out of {} slots", what),
            GpuError::InvalidInfo(why) => write!(f, "invalid creation info: {}", why),
            GpuError::InvalidHandle(what) => write!(f, "invalid {} handle", what),
            GpuError::ShaderCompile(log) => write!(f, "shader compilation failed: {}", log),
            GpuError::MissingCapability(what) => write!(f, "missing capability: {}", what),
            GpuError::BackendUnavailable(which) => {
                write!(f, "backend {} not compiled into this build", which)
            }
            #[cfg(feature = "nori-vulkan")]
            GpuError::Vulkan(res) => write!(f, "vulkan error: {}", res),
            #[cfg(feature = "nori-vulkan")]
            GpuError::VulkanLoading(err) => write!(f, "vulkan loader error: {}", err),
            #[cfg(feature = "nori-gl")]
            GpuError::Gl(err) => write!(f, "gl error: {}", err),
        }
    }
}

impl std::error::Error for GpuError {}

#[cfg(feature = "nori-vulkan")]
impl From<ash::vk::Result> for GpuError {
    fn from(res: ash::vk::Result) -> Self {
        GpuError::Vulkan(res)
    }
}

#[cfg(feature = "nori-vulkan")]
impl From<ash::LoadingError> for GpuError {
    fn from(err: ash::LoadingError) -> Self {
        GpuError::VulkanLoading(err)
    }
}

pub type Result<T, E = GpuError> = std::result::Result<T, E>;
