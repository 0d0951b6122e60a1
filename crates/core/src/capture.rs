use std::path::Path;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{ImageFormat, codecs::jpeg::JpegEncoder};
use tokio::process::Command;
use tracing::debug;

use crate::{
    error::{Result, ScribeError},
    types::{EncodedFrame, VideoMetadata},
};

pub const FRAME_MIME_TYPE: &str = "image/jpeg";

/// ffmpeg decodes nothing when asked for a frame exactly at the end of the
/// stream, so captures near the end are taken this far before it.
const END_OF_STREAM_MARGIN_SECS: f64 = 0.1;

/// What to render: a positioned surface, described by its source and metadata.
#[derive(Debug, Clone, Copy)]
pub struct FrameRequest<'a> {
    pub source: &'a Path,
    pub position: f64,
    pub metadata: VideoMetadata,
}

#[async_trait]
pub trait FrameCapture: Send + Sync {
    async fn capture(&self, request: FrameRequest<'_>) -> Result<EncodedFrame>;
}

/// Renders the frame with ffmpeg into an off-screen bitmap and re-encodes it
/// as a JPEG.
pub struct JpegFrameCapture {
    quality: u8,
}

impl JpegFrameCapture {
    /// `quality` is a 0.0..=1.0 factor.
    pub fn new(quality: f32) -> Self {
        Self {
            quality: jpeg_quality(quality),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    async fn render_bitmap(&self, request: &FrameRequest<'_>) -> Result<Vec<u8>> {
        let seek_to = request
            .position
            .min((request.metadata.duration - END_OF_STREAM_MARGIN_SECS).max(0.0));

        let output = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-ss")
            .arg(format!("{:.3}", seek_to))
            .arg("-i")
            .arg(request.source)
            .arg("-frames:v")
            .arg("1")
            .arg("-f")
            .arg("image2pipe")
            .arg("-c:v")
            .arg("ppm")
            .arg("-")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| rendering_unavailable(request, format!("could not run ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(rendering_unavailable(
                request,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        if output.stdout.is_empty() {
            return Err(rendering_unavailable(
                request,
                "no frame decoded at this position".to_string(),
            ));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl FrameCapture for JpegFrameCapture {
    async fn capture(&self, request: FrameRequest<'_>) -> Result<EncodedFrame> {
        if request.metadata.width == 0 || request.metadata.height == 0 {
            return Err(rendering_unavailable(
                &request,
                "video has no picture dimensions".to_string(),
            ));
        }

        let bitmap = self.render_bitmap(&request).await?;
        let quality = self.quality;

        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&bitmap, quality))
            .await
            .map_err(|e| rendering_unavailable(&request, format!("encoder task failed: {e}")))?
            .map_err(|e| rendering_unavailable(&request, format!("could not encode frame: {e}")))?;

        debug!(
            position = request.position,
            bytes = jpeg.len(),
            "captured frame"
        );

        Ok(EncodedFrame {
            timestamp: request.position,
            mime_type: FRAME_MIME_TYPE,
            data: STANDARD.encode(&jpeg),
        })
    }
}

/// Decode a PNM bitmap into an RGB buffer and compress it as JPEG.
pub fn encode_jpeg(bitmap: &[u8], quality: u8) -> image::ImageResult<Vec<u8>> {
    let frame = image::load_from_memory_with_format(bitmap, ImageFormat::Pnm)?.into_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(&frame)?;
    Ok(jpeg)
}

/// Map a 0.0..=1.0 quality factor onto the encoder's 1..=100 scale.
pub fn jpeg_quality(factor: f32) -> u8 {
    let factor = if factor.is_finite() { factor } else { 1.0 };
    ((factor.clamp(0.0, 1.0) * 100.0).round() as u8).max(1)
}

fn rendering_unavailable(request: &FrameRequest<'_>, reason: String) -> ScribeError {
    ScribeError::RenderingUnavailable {
        position: request.position,
        reason,
    }
}
