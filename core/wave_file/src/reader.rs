use std::io::{self, Read, Seek, SeekFrom};

use crate::{
    chunk::ChunkId,
    error::{ParseError, ParseResult},
    format::WaveFormat,
};

/// Size of the only accepted `fmt ` chunk body (the plain PCM descriptor).
pub const COMPACT_FORMAT_CHUNK_SIZE: i32 = 16;

/// Exposes the `data` chunk of a RIFF/WAVE stream as a bounded, seekable byte
/// source.
///
/// Positions reported through [`Seek`] are relative to the first sample byte
/// and always stay within `0..=len()`. Reads stop at the declared end of the
/// data chunk even when the underlying stream continues past it.
///
/// # Known limitation
///
/// The header walk looks at consecutive 4-byte words instead of following
/// chunk lengths. Chunks placed between `fmt ` and `data` are only stepped
/// over when their total size is a multiple of four; otherwise the `data`
/// tag is never seen and opening fails with [`ParseError::NoDataChunk`].
#[derive(Debug)]
pub struct PcmContainerReader<R> {
    inner: R,
    format: WaveFormat,
    riff_size: u32,
    data_start: u64,
    data_len: u64,
    position: u64,
}

enum Scan {
    Found,
    Exhausted(ChunkId),
}

impl<R: Read + Seek> PcmContainerReader<R> {
    /// Parses the container header starting at the current stream position.
    pub fn open(mut inner: R) -> ParseResult<Self> {
        let stream_len = stream_len(&mut inner)?;

        expect_tag(&mut inner, ChunkId::RIFF)?;
        // declared size is informational only, it is never checked against the stream
        let riff_size = read_u32(&mut inner)?;
        expect_tag(&mut inner, ChunkId::WAVE)?;

        if let Scan::Exhausted(found) = scan_for(&mut inner, ChunkId::FORMAT, stream_len)? {
            return Err(ParseError::BadMagic {
                expected: ChunkId::FORMAT,
                found,
            });
        }

        let format_size = read_i32(&mut inner)?;
        if format_size != COMPACT_FORMAT_CHUNK_SIZE {
            return Err(ParseError::UnsupportedFormatChunk(format_size));
        }
        let format = WaveFormat::from_header(
            read_u16(&mut inner)?,
            read_u16(&mut inner)?,
            read_u32(&mut inner)?,
            read_u32(&mut inner)?,
            read_u16(&mut inner)?,
            read_u16(&mut inner)?,
        );

        if let Scan::Exhausted(_) = scan_for(&mut inner, ChunkId::DATA, stream_len)? {
            return Err(ParseError::NoDataChunk);
        }
        if inner.stream_position()? >= stream_len {
            return Err(ParseError::NoDataChunk);
        }

        let declared = read_i32(&mut inner)?;
        let data_len = u64::try_from(declared).unwrap_or_else(|_| {
            log::warn!("data chunk declares a negative length ({declared}), treating it as empty");
            0
        });
        let data_start = inner.stream_position()?;

        log::debug!(
            "WAVE header parsed: {format}, {data_len} data bytes at offset {data_start}"
        );

        Ok(Self {
            inner,
            format,
            riff_size,
            data_start,
            data_len,
            position: 0,
        })
    }
}

impl<R> PcmContainerReader<R> {
    pub const fn format(&self) -> &WaveFormat {
        &self.format
    }

    /// Declared byte length of the PCM payload.
    pub const fn len(&self) -> u64 {
        self.data_len
    }

    pub const fn is_empty(&self) -> bool {
        self.data_len == 0
    }

    /// Absolute offset of the first sample byte in the underlying stream.
    pub const fn data_start(&self) -> u64 {
        self.data_start
    }

    /// The overall size field of the RIFF header, as written by the producer.
    pub const fn declared_riff_size(&self) -> u32 {
        self.riff_size
    }

    /// Current position relative to the start of the data region.
    pub const fn position(&self) -> u64 {
        self.position
    }

    pub const fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for PcmContainerReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data_len.saturating_sub(self.position);
        let count = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        if count == 0 {
            return Ok(0);
        }

        let read = self.inner.read(&mut buf[..count])?;
        self.position += read as u64;
        Ok(read)
    }
}

/// Offsets are relative to the data region. `SeekFrom::End(n)` follows the
/// `std::io::Seek` convention and lands at `len() + n`, so "k bytes before the
/// end" is `SeekFrom::End(-k)`.
impl<R: Seek> Seek for PcmContainerReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.data_len) + i128::from(delta),
        };
        let target = u64::try_from(target)
            .ok()
            .filter(|target| *target <= self.data_len)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "seek to {target} is outside the {} byte data region",
                        self.data_len
                    ),
                )
            })?;

        self.inner.seek(SeekFrom::Start(self.data_start + target))?;
        self.position = target;
        Ok(target)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

fn stream_len<R: Seek>(inner: &mut R) -> io::Result<u64> {
    let here = inner.stream_position()?;
    let end = inner.seek(SeekFrom::End(0))?;
    inner.seek(SeekFrom::Start(here))?;
    Ok(end)
}

/// Reads up to four bytes; a short read leaves the missing bytes zeroed so
/// a truncated tag simply fails to match.
fn read_tag<R: Read>(inner: &mut R) -> io::Result<ChunkId> {
    let mut tag = [0u8; 4];
    let mut filled = 0;
    while filled < tag.len() {
        match inner.read(&mut tag[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(ChunkId(tag))
}

fn expect_tag<R: Read>(inner: &mut R, expected: ChunkId) -> ParseResult<()> {
    let found = read_tag(inner)?;
    if found == expected {
        Ok(())
    } else {
        Err(ParseError::BadMagic { expected, found })
    }
}

fn scan_for<R: Read + Seek>(inner: &mut R, wanted: ChunkId, stream_len: u64) -> io::Result<Scan> {
    let mut last = ChunkId([0; 4]);
    while inner.stream_position()? < stream_len {
        last = read_tag(inner)?;
        if last == wanted {
            return Ok(Scan::Found);
        }
    }
    Ok(Scan::Exhausted(last))
}

fn read_u16<R: Read>(inner: &mut R) -> io::Result<u16> {
    let mut bytes = [0u8; 2];
    inner.read_exact(&mut bytes)?;
    Ok(u16::from_le_bytes(bytes))
}

fn read_u32<R: Read>(inner: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    inner.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_i32<R: Read>(inner: &mut R) -> io::Result<i32> {
    let mut bytes = [0u8; 4];
    inner.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}
