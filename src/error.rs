//! Exposes the framegraph error type

use std::sync::PoisonError;

use ash;
#[cfg(feature = "vulkan")]
use gpu_allocator::AllocationError;
use thiserror::Error;

/// Recoverable errors that the render graph can return. Contract violations (stale handles, exceeded capacities,
/// conflicting usages) are not represented here, they panic at the call site.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic Vulkan error type.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// Vulkan allocation error.
    #[cfg(feature = "vulkan")]
    #[error("Vulkan allocation error: `{0}`")]
    AllocationError(AllocationError),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// Tried to import a render target without a usage, but it was never seen by the graph before.
    #[error("Render target `{0}` was imported without a usage but has no tracked state from a previous frame.")]
    UntrackedImport(String),
    /// A lifecycle call was made out of order, for example recording before compiling.
    #[error("No compiled graph. Call `compile_new_graph()` before recording.")]
    NoGraph,
    /// Writing the dependency dump failed.
    #[error("Failed to write dependency dump: `{0}`")]
    DotDumpFailed(std::io::Error),
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

#[cfg(feature = "vulkan")]
impl From<AllocationError> for Error {
    fn from(value: AllocationError) -> Self {
        Error::AllocationError(value)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
