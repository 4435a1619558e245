//! YUV4MPEG2 container.
//!
//! Stream header: `YUV4MPEG2 W<w> H<h> F<num>:<den> Ip A1:1 C420jpeg XCOLORRANGE=FULL`, then
//! one `FRAME` record per picture carrying the Y, U and V planes back to back. Encoder input
//! is full range, which the `XCOLORRANGE` extension states for readers like ffmpeg.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::container::{
    ContainerFactory, EncodedPacket, EncoderInput, OutputContainer, StreamParams,
};
use crate::frame::chroma_dim;
use crate::ingest::FrameRate;

const MAGIC: &str = "YUV4MPEG2";

pub struct Y4mFactory;

impl ContainerFactory for Y4mFactory {
    fn name(&self) -> &'static str {
        "y4m"
    }

    fn extension(&self) -> &'static str {
        "y4m"
    }

    fn open(&self, path: &Path, params: &StreamParams) -> Result<Box<dyn OutputContainer>> {
        Ok(Box::new(Y4mContainer::create(path, params)?))
    }
}

pub struct Y4mContainer {
    writer: Option<BufWriter<File>>,
    frame_len: usize,
}

impl Y4mContainer {
    pub fn create(path: &Path, params: &StreamParams) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("create recording {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "{} W{} H{} F{}:{} Ip A1:1 C420jpeg XCOLORRANGE=FULL",
            MAGIC, params.width, params.height, params.frame_rate.num, params.frame_rate.den
        )
        .context("write y4m stream header")?;
        Ok(Self {
            writer: Some(writer),
            frame_len: frame_len(params.width, params.height),
        })
    }
}

fn frame_len(width: u32, height: u32) -> usize {
    let (w, h) = (width as usize, height as usize);
    w * h + 2 * chroma_dim(w) * chroma_dim(h)
}

impl OutputContainer for Y4mContainer {
    fn encode(&mut self, input: &EncoderInput) -> Result<Option<EncodedPacket>> {
        let len: usize = input.planes.iter().map(Vec::len).sum();
        if len != self.frame_len {
            return Err(anyhow!(
                "picture carries {} bytes, stream expects {}",
                len,
                self.frame_len
            ));
        }
        Ok(Some(EncodedPacket {
            data: input.planes.concat(),
            pts: Some(input.pts),
            dts: Some(input.pts),
            keyframe: true,
        }))
    }

    fn mux(&mut self, packet: EncodedPacket) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("y4m container already closed"))?;
        writer.write_all(b"FRAME\n").context("write y4m frame header")?;
        writer
            .write_all(&packet.data)
            .context("write y4m frame payload")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let file = writer
            .into_inner()
            .map_err(|e| anyhow!("flush y4m recording: {}", e.error()))?;
        file.sync_all().context("sync y4m recording")?;
        Ok(())
    }
}

impl Drop for Y4mContainer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("y4m container close on drop failed: {:#}", e);
        }
    }
}

/// Parsed stream header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Y4mHeader {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

fn parse_header(line: &str) -> Result<Y4mHeader> {
    let mut fields = line.split_ascii_whitespace();
    if fields.next() != Some(MAGIC) {
        return Err(anyhow!("not a YUV4MPEG2 stream"));
    }
    let (mut width, mut height, mut frame_rate) = (None, None, None);
    for field in fields {
        if !field.is_char_boundary(1) {
            continue;
        }
        let (tag, value) = field.split_at(1);
        match tag {
            "W" => width = Some(value.parse().context("y4m width")?),
            "H" => height = Some(value.parse().context("y4m height")?),
            "F" => {
                let (num, den) = value
                    .split_once(':')
                    .ok_or_else(|| anyhow!("malformed y4m frame rate '{}'", value))?;
                frame_rate = Some(FrameRate::new(
                    num.parse().context("y4m rate numerator")?,
                    den.parse().context("y4m rate denominator")?,
                ));
            }
            "C" if !value.starts_with("420") => {
                return Err(anyhow!("unsupported y4m colorspace C{}", value));
            }
            _ => {}
        }
    }
    Ok(Y4mHeader {
        width: width.ok_or_else(|| anyhow!("y4m header missing width"))?,
        height: height.ok_or_else(|| anyhow!("y4m header missing height"))?,
        frame_rate: frame_rate.unwrap_or(FrameRate::fps(25)),
    })
}

fn read_line(reader: &mut impl BufRead) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        return Err(anyhow!("truncated y4m header line"));
    }
    buf.pop();
    Ok(Some(String::from_utf8(buf).context("y4m header is not ascii")?))
}

/// Read the stream header of a y4m file.
pub fn read_header(path: &Path) -> Result<Y4mHeader> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("open {}", path.display()))?,
    );
    let line = read_line(&mut reader)?.ok_or_else(|| anyhow!("empty y4m file"))?;
    parse_header(&line)
}

/// Count complete frames in a y4m file. A truncated trailing frame is an error.
pub fn count_frames(path: &Path) -> Result<u64> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("open {}", path.display()))?,
    );
    let line = read_line(&mut reader)?.ok_or_else(|| anyhow!("empty y4m file"))?;
    let header = parse_header(&line)?;
    let frame_len = frame_len(header.width, header.height) as u64;

    let mut frames = 0u64;
    while let Some(line) = read_line(&mut reader)? {
        if !line.starts_with("FRAME") {
            return Err(anyhow!("expected FRAME marker after {} frames", frames));
        }
        let copied = std::io::copy(&mut (&mut reader).take(frame_len), &mut std::io::sink())?;
        if copied != frame_len {
            return Err(anyhow!("frame {} is truncated", frames));
        }
        frames += 1;
    }
    Ok(frames)
}
