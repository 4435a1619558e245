//! MP4 recording using FFmpeg's MPEG-4 part 2 encoder.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::collections::VecDeque;
use std::path::Path;

use super::container::{
    ContainerFactory, EncodedPacket, EncoderInput, OutputContainer, StreamParams,
};

pub struct Mp4Factory;

impl ContainerFactory for Mp4Factory {
    fn name(&self) -> &'static str {
        "mp4/mpeg4"
    }

    fn extension(&self) -> &'static str {
        "mp4"
    }

    fn open(&self, path: &Path, params: &StreamParams) -> Result<Box<dyn OutputContainer>> {
        Ok(Box::new(Mp4Container::create(path, params)?))
    }
}

struct Muxer {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
}

pub struct Mp4Container {
    muxer: Option<Muxer>,
    params: StreamParams,
    pending: VecDeque<EncodedPacket>,
}

impl Mp4Container {
    pub fn create(path: &Path, params: &StreamParams) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("create recording {}", path.display()))?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg has no MPEG-4 encoder"))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let rate = params.frame_rate;
        let encoder_time_base = ffmpeg::Rational::new(rate.den as i32, rate.num as i32);

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create mpeg4 encoder")?;
        encoder.set_width(params.width);
        encoder.set_height(params.height);
        encoder.set_format(ffmpeg::format::Pixel::YUV420P);
        // Encoder input is always full range.
        encoder.set_color_range(ffmpeg::util::color::Range::JPEG);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(rate.num as i32, rate.den as i32)));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).context("open mpeg4 encoder")?;

        let stream_index = {
            let mut stream = output.add_stream(codec).context("add video stream")?;
            stream.set_parameters(&encoder);
            stream.set_time_base(encoder_time_base);
            stream.index()
        };
        output.write_header().context("write mp4 header")?;

        Ok(Self {
            muxer: Some(Muxer {
                output,
                encoder,
                stream_index,
                encoder_time_base,
            }),
            params: *params,
            pending: VecDeque::new(),
        })
    }

    fn drain_encoder(muxer: &mut Muxer, pending: &mut VecDeque<EncodedPacket>) {
        let mut packet = ffmpeg::Packet::empty();
        while muxer.encoder.receive_packet(&mut packet).is_ok() {
            pending.push_back(EncodedPacket {
                data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                pts: packet.pts(),
                dts: packet.dts(),
                keyframe: packet.is_key(),
            });
        }
    }

    fn write_packet(muxer: &mut Muxer, packet: EncodedPacket) -> Result<()> {
        let stream_time_base = muxer
            .output
            .stream(muxer.stream_index)
            .map(|s| s.time_base())
            .ok_or_else(|| anyhow!("video stream missing from mp4 output"))?;
        let mut out = ffmpeg::Packet::copy(&packet.data);
        out.set_pts(packet.pts);
        out.set_dts(packet.dts);
        if packet.keyframe {
            out.set_flags(ffmpeg::codec::packet::Flags::KEY);
        }
        out.set_stream(muxer.stream_index);
        out.rescale_ts(muxer.encoder_time_base, stream_time_base);
        out.write_interleaved(&mut muxer.output)
            .context("write mp4 packet")
    }
}

impl OutputContainer for Mp4Container {
    fn encode(&mut self, input: &EncoderInput) -> Result<Option<EncodedPacket>> {
        let muxer = self
            .muxer
            .as_mut()
            .ok_or_else(|| anyhow!("mp4 container already closed"))?;

        let mut frame = ffmpeg::frame::Video::new(
            ffmpeg::format::Pixel::YUV420P,
            self.params.width,
            self.params.height,
        );
        frame.set_color_range(ffmpeg::util::color::Range::JPEG);
        for (index, plane) in input.planes.iter().enumerate() {
            let row_bytes = frame.plane_width(index) as usize;
            let rows = frame.plane_height(index) as usize;
            if plane.len() != row_bytes * rows {
                return Err(anyhow!(
                    "plane {} carries {} bytes, encoder expects {}",
                    index,
                    plane.len(),
                    row_bytes * rows
                ));
            }
            let stride = frame.stride(index);
            let data = frame.data_mut(index);
            for (row, src) in plane.chunks_exact(row_bytes).enumerate() {
                let start = row * stride;
                data.get_mut(start..start + row_bytes)
                    .ok_or_else(|| anyhow!("encoder frame row out of bounds"))?
                    .copy_from_slice(src);
            }
        }
        frame.set_pts(Some(input.pts));

        muxer
            .encoder
            .send_frame(&frame)
            .context("send frame to mpeg4 encoder")?;
        Self::drain_encoder(muxer, &mut self.pending);
        Ok(self.pending.pop_front())
    }

    fn mux(&mut self, packet: EncodedPacket) -> Result<()> {
        let muxer = self
            .muxer
            .as_mut()
            .ok_or_else(|| anyhow!("mp4 container already closed"))?;
        Self::write_packet(muxer, packet)
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut muxer) = self.muxer.take() else {
            return Ok(());
        };
        if let Err(e) = muxer.encoder.send_eof() {
            log::warn!("Recorder: mpeg4 encoder flush failed: {}", e);
        }
        Self::drain_encoder(&mut muxer, &mut self.pending);
        let mut first_error = None;
        while let Some(packet) = self.pending.pop_front() {
            if let Err(e) = Self::write_packet(&mut muxer, packet) {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = muxer.output.write_trailer() {
            first_error.get_or_insert(anyhow!("write mp4 trailer: {}", e));
        }
        // Dropping the output context closes the file.
        drop(muxer);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Mp4Container {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("mp4 container close on drop failed: {:#}", e);
        }
    }
}
