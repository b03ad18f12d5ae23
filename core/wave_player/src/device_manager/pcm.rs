use wave_file::{FormatTag, WaveFormat};

use super::DeviceError;

/// On-the-wire encoding of a single little-endian sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    U8,
    I16,
    I24,
    I32,
    F32,
    F64,
}

impl SampleEncoding {
    pub fn for_format(format: &WaveFormat) -> Result<Self, DeviceError> {
        let encoding = match (format.format_tag(), format.bits_per_sample()) {
            (FormatTag::Pcm, 8) => Self::U8,
            (FormatTag::Pcm, 16) => Self::I16,
            (FormatTag::Pcm, 24) => Self::I24,
            (FormatTag::Pcm, 32) => Self::I32,
            (FormatTag::IeeeFloat, 32) => Self::F32,
            (FormatTag::IeeeFloat, 64) => Self::F64,
            (tag, bits) => {
                return Err(DeviceError::UnsupportedFormat(format!(
                    "{tag} with {bits} bits per sample"
                )));
            }
        };
        Ok(encoding)
    }

    pub const fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I24 => 3,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// `bytes` must hold exactly [`width`](Self::width) bytes.
    fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            Self::U8 => (f32::from(bytes[0]) - 128.0) / 128.0,
            Self::I16 => f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) / 32_768.0,
            Self::I24 => {
                (i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8) as f32 / 8_388_608.0
            }
            Self::I32 => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                    / 2_147_483_648.0
            }
            Self::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                f64::from_le_bytes(raw) as f32
            }
        }
    }
}

/// Byte-at-a-time sample decoder.
///
/// Sample fragments are carried over between calls, so a sample that
/// straddles two device buffers still decodes correctly. Never allocates.
#[derive(Debug, Clone)]
pub struct SampleDecoder {
    encoding: SampleEncoding,
    pending: [u8; 8],
    filled: usize,
}

impl SampleDecoder {
    pub const fn new(encoding: SampleEncoding) -> Self {
        Self {
            encoding,
            pending: [0; 8],
            filled: 0,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<f32> {
        self.pending[self.filled] = byte;
        self.filled += 1;

        let width = self.encoding.width();
        if self.filled < width {
            return None;
        }
        self.filled = 0;
        Some(self.encoding.decode(&self.pending[..width]))
    }

    /// Drops a partially received sample.
    pub const fn clear(&mut self) {
        self.filled = 0;
    }
}
