use std::path::{Path, PathBuf};

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::Rational;

use crate::shared::constants::BYTES_PER_PIXEL;
use crate::shared::frame::FrameBuffer;
use crate::video::domain::video_writer::{EncodeError, VideoFormat, VideoWriter};

/// Rough MJPEG budget; keeps intra-only frames readable at any size.
const BITS_PER_PIXEL: usize = 2;

const ENCODED_PIXEL: Pixel = Pixel::YUVJ420P;

/// Encodes RGBA frames to Motion-JPEG via ffmpeg-next.
///
/// The container is picked from the output extension (`.avi` in practice).
/// Every frame is an intra frame, so a file cut short by a crash is still
/// playable up to the last written packet.
pub struct FfmpegWriter {
    stream: Option<OpenStream>,
}

struct OpenStream {
    path: PathBuf,
    octx: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    scaler: scaling::Context,
    format: VideoFormat,
    encoder_time_base: Rational,
    frame_count: u64,
}

// Safety: FfmpegWriter is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegWriter {}

impl FfmpegWriter {
    pub fn new() -> Self {
        Self { stream: None }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Frames written since the last `open`.
    pub fn frame_count(&self) -> u64 {
        self.stream.as_ref().map_or(0, |s| s.frame_count)
    }
}

impl Default for FfmpegWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoWriter for FfmpegWriter {
    fn open(&mut self, path: &Path, format: &VideoFormat) -> Result<(), EncodeError> {
        if format.geometry.is_empty() {
            return Err(EncodeError::InvalidGeometry(format.geometry));
        }
        if self.stream.is_some() {
            self.close()?;
        }

        let open_err = |reason: String| EncodeError::Open {
            path: path.to_path_buf(),
            reason,
        };
        let stream = OpenStream::open(path, format).map_err(|e| open_err(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn write(&mut self, frame: &FrameBuffer) -> Result<(), EncodeError> {
        let stream = self.stream.as_mut().ok_or(EncodeError::NotOpen)?;
        let index = stream.frame_count;
        if !frame.fits(stream.format.geometry) {
            return Err(EncodeError::Write {
                index,
                reason: format!(
                    "buffer of {} bytes is smaller than a {} frame",
                    frame.len(),
                    stream.format.geometry
                ),
            });
        }
        stream
            .encode(frame)
            .map_err(|e| EncodeError::Write {
                index,
                reason: e.to_string(),
            })?;
        stream.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        stream.finish().map_err(|e| {
            EncodeError::Close(format!("{}: {e}", stream.path.display()))
        })
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("{e}");
        }
    }
}

impl OpenStream {
    fn open(path: &Path, format: &VideoFormat) -> Result<Self, ffmpeg_next::Error> {
        ffmpeg_next::init()?;

        let width = format.geometry.width;
        let height = format.geometry.height;
        let fps = format.fps.max(1) as i32;

        let mut octx = ffmpeg_next::format::output(&path)?;

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MJPEG)
            .ok_or(ffmpeg_next::Error::EncoderNotFound)?;

        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;

        let encoder_time_base = Rational(1, fps);
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ENCODED_PIXEL);
        encoder_ctx.set_time_base(encoder_time_base);
        encoder_ctx.set_frame_rate(Some(Rational(fps, 1)));
        let pixels = width as usize * height as usize;
        encoder_ctx.set_bit_rate(pixels * fps as usize * BITS_PER_PIXEL);

        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);
        ost.set_time_base(encoder_time_base);

        octx.write_header()?;

        let scaler = scaling::Context::get(
            Pixel::RGBA,
            width,
            height,
            ENCODED_PIXEL,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            path: path.to_path_buf(),
            octx,
            encoder,
            scaler,
            format: *format,
            encoder_time_base,
            frame_count: 0,
        })
    }

    fn encode(&mut self, frame: &FrameBuffer) -> Result<(), ffmpeg_next::Error> {
        let width = self.format.geometry.width;
        let height = self.format.geometry.height;

        let mut rgba_frame =
            ffmpeg_next::util::frame::video::Video::new(Pixel::RGBA, width, height);

        let row_len = width as usize * BYTES_PER_PIXEL;
        let stride = rgba_frame.stride(0);
        let dst = rgba_frame.data_mut(0);
        let src = frame.data();

        // Copy pixel data, respecting stride
        for row in 0..height as usize {
            let src_start = row * row_len;
            let dst_start = row * stride;
            dst[dst_start..dst_start + row_len]
                .copy_from_slice(&src[src_start..src_start + row_len]);
        }

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&rgba_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(self.frame_count as i64));

        self.encoder.send_frame(&yuv_frame)?;
        self.drain_packets()
    }

    fn drain_packets(&mut self) -> Result<(), ffmpeg_next::Error> {
        let ost_time_base = self
            .octx
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or(self.encoder_time_base);

        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(self.encoder_time_base, ost_time_base);
            encoded.write_interleaved(&mut self.octx)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ffmpeg_next::Error> {
        self.encoder.send_eof()?;
        self.drain_packets()?;
        self.octx.write_trailer()
    }
}
