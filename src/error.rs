//! Error types shared across the crate.
//!
//! Three failure paths are surfaced to callers: creating the GPU context,
//! awaited compute dispatches and reading storage buffers back to the CPU.
//! Configuration errors live in [`crate::config`]; [`AppError`] gathers the
//! fatal ones for the binary. Everything else (shader compilation, resource
//! exhaustion) is reported by wgpu's own uncaptured-error handler.

use std::fmt;

use crate::config::ConfigError;

/// Errors that can occur while creating a [`GpuContext`](crate::GpuContext).
#[derive(Debug)]
pub enum GpuError {
    /// Failed to create a wgpu surface from the window handle.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    AdapterRequest(wgpu::RequestAdapterError),
    /// GPU device request failed (limits or features not met).
    DeviceRequest(wgpu::RequestDeviceError),
    /// The surface reports no supported texture formats for this adapter.
    UnsupportedSurface,
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SurfaceCreation(e) => write!(f, "surface creation failed: {e}"),
            Self::AdapterRequest(e) => write!(f, "no compatible GPU adapter found: {e}"),
            Self::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            Self::UnsupportedSurface => {
                write!(f, "surface configuration not supported by adapter")
            }
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SurfaceCreation(e) => Some(e),
            Self::AdapterRequest(e) => Some(e),
            Self::DeviceRequest(e) => Some(e),
            Self::UnsupportedSurface => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for GpuError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        GpuError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestAdapterError> for GpuError {
    fn from(e: wgpu::RequestAdapterError) -> Self {
        GpuError::AdapterRequest(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceRequest(e)
    }
}

/// An awaited compute dispatch was rejected.
///
/// Callers treat this as best-effort: the error is logged and the buffers the
/// kernel would have written keep their previous (zeroed) contents.
#[derive(Debug)]
pub enum DispatchError {
    /// The device rejected the dispatch (validation or out-of-memory scope).
    Rejected {
        /// Label of the kernel that failed.
        kernel: &'static str,
        /// The error captured by the wgpu error scope.
        source: wgpu::Error,
    },
    /// Waiting for the submission to retire failed (device lost or timeout).
    Poll {
        /// Label of the kernel that was being awaited.
        kernel: &'static str,
        /// The poll failure reported by the device.
        source: wgpu::PollError,
    },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { kernel, source } => {
                write!(f, "compute dispatch '{kernel}' rejected: {source}")
            }
            Self::Poll { kernel, source } => {
                write!(f, "waiting for compute dispatch '{kernel}' failed: {source}")
            }
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rejected { source, .. } => Some(source),
            Self::Poll { source, .. } => Some(source),
        }
    }
}

/// Copying a storage buffer back to the CPU failed.
#[derive(Debug)]
pub enum ReadbackError {
    /// Mapping the staging buffer failed.
    Map(wgpu::BufferAsyncError),
    /// The device could not be polled to completion.
    Poll(wgpu::PollError),
    /// The map callback was dropped without reporting a result.
    Disconnected,
}

impl fmt::Display for ReadbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map(e) => write!(f, "failed to map readback buffer: {e}"),
            Self::Poll(e) => write!(f, "failed to wait for readback: {e}"),
            Self::Disconnected => write!(f, "readback callback dropped before completion"),
        }
    }
}

impl std::error::Error for ReadbackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Map(e) => Some(e),
            Self::Poll(e) => Some(e),
            Self::Disconnected => None,
        }
    }
}

impl From<wgpu::BufferAsyncError> for ReadbackError {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        ReadbackError::Map(e)
    }
}

impl From<wgpu::PollError> for ReadbackError {
    fn from(e: wgpu::PollError) -> Self {
        ReadbackError::Poll(e)
    }
}

/// Fatal errors that stop the host loop.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Gpu(GpuError),
    Window(winit::error::OsError),
    EventLoop(winit::error::EventLoopError),
    /// Acquiring the next surface texture failed unrecoverably.
    Surface(wgpu::SurfaceError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Gpu(e) => write!(f, "GPU initialization failed: {e}"),
            Self::Window(e) => write!(f, "window creation failed: {e}"),
            Self::EventLoop(e) => write!(f, "event loop error: {e}"),
            Self::Surface(e) => write!(f, "surface error: {e}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Gpu(e) => Some(e),
            Self::Window(e) => Some(e),
            Self::EventLoop(e) => Some(e),
            Self::Surface(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<GpuError> for AppError {
    fn from(e: GpuError) -> Self {
        AppError::Gpu(e)
    }
}

impl From<winit::error::OsError> for AppError {
    fn from(e: winit::error::OsError) -> Self {
        AppError::Window(e)
    }
}

impl From<winit::error::EventLoopError> for AppError {
    fn from(e: winit::error::EventLoopError) -> Self {
        AppError::EventLoop(e)
    }
}

impl From<wgpu::SurfaceError> for AppError {
    fn from(e: wgpu::SurfaceError) -> Self {
        AppError::Surface(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_surface_has_no_source() {
        let err = GpuError::UnsupportedSurface;
        assert!(std::error::Error::source(&err).is_none());
        assert_eq!(
            err.to_string(),
            "surface configuration not supported by adapter"
        );
    }

    #[test]
    fn config_errors_pass_through_unchanged() {
        let err = AppError::from(ConfigError::MissingDemo);
        assert_eq!(err.to_string(), ConfigError::MissingDemo.to_string());
        assert!(std::error::Error::source(&err).is_some());
    }
}
