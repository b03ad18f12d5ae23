use std::fmt;

/// Encoding code stored in the first field of a `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    Pcm,
    IeeeFloat,
    Other(u16),
}

impl FormatTag {
    pub const PCM_CODE: u16 = 1;
    pub const IEEE_FLOAT_CODE: u16 = 3;

    pub const fn from_code(code: u16) -> Self {
        match code {
            Self::PCM_CODE => Self::Pcm,
            Self::IEEE_FLOAT_CODE => Self::IeeeFloat,
            other => Self::Other(other),
        }
    }

    pub const fn code(self) -> u16 {
        match self {
            Self::Pcm => Self::PCM_CODE,
            Self::IeeeFloat => Self::IEEE_FLOAT_CODE,
            Self::Other(code) => code,
        }
    }

    /// Whether samples with this tag can be handed to an output device as-is.
    pub const fn is_playable(self) -> bool {
        matches!(self, Self::Pcm | Self::IeeeFloat)
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pcm => write!(f, "PCM"),
            Self::IeeeFloat => write!(f, "IEEE float"),
            Self::Other(code) => write!(f, "format 0x{code:04X}"),
        }
    }
}

/// Layout of interleaved PCM frames.
///
/// Built either from the three primary parameters (block align and byte rate
/// are derived), or verbatim from a container header, in which case the
/// header's own block align and byte rate are kept even when they disagree
/// with the primary fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    format_tag: FormatTag,
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

impl WaveFormat {
    /// PCM layout with derived block align and byte rate.
    pub const fn new(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        let block_align = channels * (bits_per_sample / 8);
        Self {
            format_tag: FormatTag::Pcm,
            channels,
            sample_rate,
            byte_rate: sample_rate * block_align as u32,
            block_align,
            bits_per_sample,
        }
    }

    /// Same as [`WaveFormat::new`] but with an explicit encoding.
    pub const fn with_tag(mut self, format_tag: FormatTag) -> Self {
        self.format_tag = format_tag;
        self
    }

    /// All six fields as they appear in a 16-byte `fmt ` chunk.
    pub(crate) const fn from_header(
        format_tag: u16,
        channels: u16,
        sample_rate: u32,
        byte_rate: u32,
        block_align: u16,
        bits_per_sample: u16,
    ) -> Self {
        Self {
            format_tag: FormatTag::from_code(format_tag),
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
        }
    }

    pub const fn format_tag(&self) -> FormatTag {
        self.format_tag
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn byte_rate(&self) -> u32 {
        self.byte_rate
    }

    pub const fn block_align(&self) -> u16 {
        self.block_align
    }

    pub const fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub const fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample / 8
    }

    /// Byte value that decodes to silence: 8-bit PCM is unsigned and centred
    /// on 0x80, every other layout is centred on zero.
    pub const fn silence_byte(&self) -> u8 {
        if self.bits_per_sample == 8 { 0x80 } else { 0x00 }
    }
}

impl fmt::Display for WaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} Hz, {}-bit, {} ch",
            self.format_tag, self.sample_rate, self.bits_per_sample, self.channels
        )
    }
}
