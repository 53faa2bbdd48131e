//! Image transforms for the `/img` proxy.
//!
//! Decoding and resizing happen on the blocking pool.  Encoding writes into
//! a bounded channel that feeds the response body, so the encoded output is
//! never held in memory as a whole and a closed connection stops the encoder
//! at its next write.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::{self, Cursor, Write};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::config::{ImageConfig, MAX_IMAGE_QUALITY, MIN_IMAGE_QUALITY};
use crate::metrics::record_transform;
use crate::storage::ByteStream;

/// Source content types the proxy will decode.
const TRANSFORMABLE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

/// Size of each chunk handed to the response body.
const OUTPUT_CHUNK: usize = 32 * 1024;

/// Chunks buffered between the encoder and the response.
const CHANNEL_DEPTH: usize = 4;

/// AVIF encoder speed (1 slowest .. 10 fastest).
const AVIF_SPEED: u8 = 8;

/// Whether the proxy transforms objects of this content type.
pub fn is_transformable(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    TRANSFORMABLE_TYPES.contains(&essence.as_str())
}

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl OutputFormat {
    /// Parse an explicit `fmt` value.  `auto` and unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// Pick the output format: an explicit `fmt` wins, then the `Accept`
    /// header (avif over webp), then webp.
    pub fn negotiate(fmt: Option<&str>, accept: Option<&str>) -> Self {
        if let Some(explicit) = fmt.and_then(Self::parse) {
            return explicit;
        }
        let accept = accept.unwrap_or("").to_ascii_lowercase();
        if accept.contains("image/avif") {
            Self::Avif
        } else {
            Self::Webp
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }
}

/// Parse a numeric query value, floor it and clamp it to `[min, max]`.
/// Missing or non-numeric input yields `None`.
pub fn clamp_int(raw: Option<&str>, min: i64, max: i64) -> Option<i64> {
    let n: f64 = raw?.trim().parse().ok()?;
    if !n.is_finite() {
        return None;
    }
    Some((n.floor() as i64).clamp(min, max))
}

/// Resolved transform for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParams {
    /// Target width; `None` keeps the source width.
    pub width: Option<u32>,
    pub quality: u8,
    pub format: OutputFormat,
}

impl TransformParams {
    /// Build params from raw `w`, `q` and `fmt` query values plus the
    /// request's `Accept` header.
    pub fn resolve(
        w: Option<&str>,
        q: Option<&str>,
        fmt: Option<&str>,
        accept: Option<&str>,
        config: &ImageConfig,
    ) -> Self {
        let width = clamp_int(w, 1, i64::from(config.max_width.max(1))).map(|w| w as u32);
        let quality = clamp_int(
            q,
            i64::from(MIN_IMAGE_QUALITY),
            i64::from(MAX_IMAGE_QUALITY),
        )
        .map(|q| q as u8)
        .unwrap_or(config.default_quality);
        Self {
            width,
            quality,
            format: OutputFormat::negotiate(fmt, accept),
        }
    }
}

/// Decode `data` and shrink it to fit within `width`, never enlarging.
pub fn decode_and_resize(data: &[u8], width: Option<u32>) -> anyhow::Result<DynamicImage> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;
    match width {
        Some(w) if w < img.width() => Ok(img.resize(w, u32::MAX, FilterType::Lanczos3)),
        _ => Ok(img),
    }
}

/// Encode `img` into `writer`.
pub fn encode<W: Write>(
    img: &DynamicImage,
    format: OutputFormat,
    quality: u8,
    mut writer: W,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(writer, quality))?;
        }
        OutputFormat::Png => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(PngEncoder::new(writer))?;
        }
        OutputFormat::Webp => {
            // libwebp has no incremental writer; the lossy output is small
            // enough to hand over in one piece.
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            let encoder = webp::Encoder::from_image(&rgba)
                .map_err(|e| anyhow::anyhow!("webp encoder rejected image: {e}"))?;
            let encoded = encoder.encode(f32::from(quality));
            writer.write_all(&encoded)?;
        }
        OutputFormat::Avif => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(AvifEncoder::new_with_speed_quality(
                writer, AVIF_SPEED, quality,
            ))?;
        }
    }
    Ok(())
}

/// `Write` adapter that forwards fixed-size chunks into a channel.
///
/// A send fails once the receiving body is dropped; that surfaces to the
/// encoder as `BrokenPipe`.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: BytesMut,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buf: BytesMut::with_capacity(OUTPUT_CHUNK),
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response closed"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = OUTPUT_CHUNK - self.buf.len();
        let n = data.len().min(room);
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() >= OUTPUT_CHUNK {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Encode `img` on the blocking pool and return the output as a stream.
///
/// An encoder failure is logged and ends the stream with an error, which
/// aborts the response body.
pub fn encode_stream(img: DynamicImage, format: OutputFormat, quality: u8) -> ByteStream {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_DEPTH);
    tokio::task::spawn_blocking(move || {
        let mut writer = ChannelWriter::new(tx.clone());
        let result = encode(&img, format, quality, &mut writer)
            .and_then(|()| writer.flush().map_err(anyhow::Error::from));
        record_transform(format.label(), result.is_ok());
        if let Err(e) = result {
            if tx.is_closed() {
                debug!("image encode stopped, client went away ({})", format.label());
            } else {
                error!("image encode failed ({}): {:#}", format.label(), e);
                let _ = tx.blocking_send(Err(io::Error::other(format!("encode failed: {e}"))));
            }
        }
    });
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}

/// Read a source object fully, refusing anything over `limit` bytes.
pub async fn read_source(mut stream: ByteStream, limit: usize) -> anyhow::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            anyhow::bail!("source image exceeds {limit} bytes");
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
