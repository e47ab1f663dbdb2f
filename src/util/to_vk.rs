//! Conversion of graph-level descriptions into their Vulkan equivalents.

/// Convert a graph type into the Vulkan struct or enum the backend consumes.
pub trait IntoVulkanType {
    /// Output Vulkan type
    type Output;

    /// Consume self and return a vulkan type
    fn into_vulkan(self) -> Self::Output;
}
