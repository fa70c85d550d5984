// SPDX-License-Identifier: MPL-2.0

//! H.264 encoder selection and the encoder side of the conversion engine
//!
//! The conversion engine hands each converted [`Picture`] to an [`Encoder`]
//! and expects it to be fully consumed before `encode` returns. The picture
//! borrows the mapped GPU output and is invalid afterwards.

pub mod h264;
pub mod video;

pub use h264::{GstH264Encoder, H264EncoderConfig};
pub use video::{EncoderInfo, enumerate_h264_encoders, select_h264_encoder};

use crate::convert::Picture;
use crate::errors::EncodeError;

/// Consumer of converted pictures
pub trait Encoder {
    /// Encode one picture synchronously, returning the compressed bytes
    /// written to the output. Zero is a valid result while the encoder is
    /// still filling its lookahead.
    fn encode(&mut self, picture: &Picture<'_>) -> Result<usize, EncodeError>;

    /// Flush delayed output at end of stream
    fn finish(&mut self) -> Result<usize, EncodeError> {
        Ok(0)
    }
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    fn encode(&mut self, picture: &Picture<'_>) -> Result<usize, EncodeError> {
        (**self).encode(picture)
    }

    fn finish(&mut self) -> Result<usize, EncodeError> {
        (**self).finish()
    }
}
