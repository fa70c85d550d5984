// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture, conversion and encoding stages

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for the conversion engine
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Top-level error surfaced by the binary
#[derive(Debug, Clone)]
pub enum AppError {
    /// GPU conversion errors
    Convert(ConvertError),
    /// Capture source errors
    Capture(CaptureError),
    /// Encoder errors outside of a conversion call (setup, flush)
    Encode(EncodeError),
    /// Configuration errors
    Config(String),
    /// Output sink / filesystem errors
    Io(String),
}

/// GPU buffer that failed to map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedBuffer {
    /// Packed input buffer (write mapping)
    Input,
    /// Planar output buffer (read mapping)
    Output,
}

/// Errors of the conversion engine and its compute context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Width not a multiple of 16 or height not a multiple of 2
    InvalidGeometry { width: u32, height: u32 },
    /// GPU device node could not be opened
    DeviceOpenFailed { path: String, reason: String },
    /// No GPU connection could be established over the device
    DisplayInitFailed(String),
    /// The GPU lacks a capability the conversion needs
    UnsupportedDevice(String),
    /// Logical device, queue or buffers could not be created
    ContextCreationFailed(String),
    /// The conversion program failed to compile or link
    ShaderCompileFailed(String),
    /// A GPU buffer could not be mapped for this frame
    MappingFailed { buffer: MappedBuffer, reason: String },
    /// The GPU reported an error while running the conversion
    DispatchFailed(String),
    /// The encoder rejected the converted picture
    EncodeFailed(String),
}

impl ConvertError {
    /// Name of the stage that failed, used in fatal diagnostics
    pub fn stage(&self) -> &'static str {
        match self {
            ConvertError::InvalidGeometry { .. } => "geometry validation",
            ConvertError::DeviceOpenFailed { .. } => "device open",
            ConvertError::DisplayInitFailed(_) => "display initialization",
            ConvertError::UnsupportedDevice(_) => "capability check",
            ConvertError::ContextCreationFailed(_) => "context creation",
            ConvertError::ShaderCompileFailed(_) => "shader compilation",
            ConvertError::MappingFailed { .. } => "buffer mapping",
            ConvertError::DispatchFailed(_) => "compute dispatch",
            ConvertError::EncodeFailed(_) => "encode",
        }
    }

    /// Whether the error happened while constructing the engine
    pub fn is_construction(&self) -> bool {
        !matches!(
            self,
            ConvertError::MappingFailed { .. }
                | ConvertError::DispatchFailed(_)
                | ConvertError::EncodeFailed(_)
        )
    }
}

/// Encoder errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// No usable H.264 encoder element is installed
    NoEncoderAvailable(String),
    /// Pipeline construction or state change failed
    Pipeline(String),
    /// Picture could not be handed to the encoder
    Push(String),
    /// Compressed output could not be written
    Sink(String),
}

/// Capture source errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Device could not be opened
    DeviceOpen(String),
    /// Device lacks video capture or streaming support
    Unsupported(String),
    /// Requested format was not accepted
    Format(String),
    /// Dequeue or re-queue failed
    Stream(String),
    /// Raw file read failed
    Io(String),
    /// Source has no more frames
    EndOfStream,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Convert(e) => write!(f, "Conversion error: {}", e),
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Encode(e) => write!(f, "Encoder error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for MappedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappedBuffer::Input => write!(f, "input"),
            MappedBuffer::Output => write!(f, "output"),
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::InvalidGeometry { width, height } => write!(
                f,
                "{}: {}x{} is invalid, width and height must be non-zero multiples of 16 and 2 respectively",
                self.stage(),
                width,
                height
            ),
            ConvertError::DeviceOpenFailed { path, reason } => {
                write!(f, "{}: failed to open {}: {}", self.stage(), path, reason)
            }
            ConvertError::MappingFailed { buffer, reason } => write!(
                f,
                "{}: failed to map {} buffer: {}",
                self.stage(),
                buffer,
                reason
            ),
            ConvertError::DisplayInitFailed(msg)
            | ConvertError::UnsupportedDevice(msg)
            | ConvertError::ContextCreationFailed(msg)
            | ConvertError::ShaderCompileFailed(msg)
            | ConvertError::DispatchFailed(msg)
            | ConvertError::EncodeFailed(msg) => write!(f, "{}: {}", self.stage(), msg),
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::NoEncoderAvailable(msg) => write!(f, "No encoder available: {}", msg),
            EncodeError::Pipeline(msg) => write!(f, "Pipeline error: {}", msg),
            EncodeError::Push(msg) => write!(f, "Failed to push picture: {}", msg),
            EncodeError::Sink(msg) => write!(f, "Failed to write output: {}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceOpen(msg) => write!(f, "Failed to open capture device: {}", msg),
            CaptureError::Unsupported(msg) => write!(f, "Unsupported capture device: {}", msg),
            CaptureError::Format(msg) => write!(f, "Format negotiation failed: {}", msg),
            CaptureError::Stream(msg) => write!(f, "Stream error: {}", msg),
            CaptureError::Io(msg) => write!(f, "Read error: {}", msg),
            CaptureError::EndOfStream => write!(f, "End of stream"),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for ConvertError {}
impl std::error::Error for EncodeError {}
impl std::error::Error for CaptureError {}

// Conversions from sub-errors to AppError
impl From<ConvertError> for AppError {
    fn from(err: ConvertError) -> Self {
        AppError::Convert(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<EncodeError> for AppError {
    fn from(err: EncodeError) -> Self {
        AppError::Encode(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

// An encoder failure inside `convert` is a per-frame conversion failure
impl From<EncodeError> for ConvertError {
    fn from(err: EncodeError) -> Self {
        ConvertError::EncodeFailed(err.to_string())
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_in_display() {
        let err = ConvertError::ShaderCompileFailed("entry point missing".into());
        assert_eq!(err.to_string(), "shader compilation: entry point missing");

        let err = ConvertError::MappingFailed {
            buffer: MappedBuffer::Output,
            reason: "device lost".into(),
        };
        assert!(err.to_string().starts_with("buffer mapping"));
        assert!(err.to_string().contains("output buffer"));
    }

    #[test]
    fn test_construction_classification() {
        assert!(ConvertError::InvalidGeometry { width: 15, height: 2 }.is_construction());
        assert!(ConvertError::UnsupportedDevice("no compute".into()).is_construction());
        assert!(!ConvertError::DispatchFailed("oom".into()).is_construction());
        assert!(!ConvertError::EncodeFailed("eos".into()).is_construction());
    }

    #[test]
    fn test_encode_error_maps_to_encode_failed() {
        let err: ConvertError = EncodeError::Push("flushing".into()).into();
        assert!(matches!(err, ConvertError::EncodeFailed(_)));
    }
}
