use std::{
    io::{self, Read, Seek, SeekFrom},
    sync::{Arc, Mutex, PoisonError},
};

/// Producer-side source of sample bytes. Must fill the whole slice.
pub type FillCallback = Box<dyn FnMut(&mut [u8]) + Send>;

/// Fills `buffer` from `source`, rewinding to the start whenever the source
/// runs dry so that short sources repeat within a single buffer.
///
/// A source that yields nothing right after a rewind is empty, and a source
/// that fails with an I/O error cannot make progress: in both cases the rest
/// of the buffer is set to `silence`.
pub fn fill_looping<S>(source: &mut S, buffer: &mut [u8], silence: u8)
where
    S: Read + Seek + ?Sized,
{
    let mut filled = 0;
    let mut just_rewound = false;

    while filled < buffer.len() {
        match source.read(&mut buffer[filled..]) {
            Ok(0) if just_rewound => {
                log::debug!("Sample source is empty, padding with silence");
                break;
            }
            Ok(0) => {
                if let Err(err) = source.seek(SeekFrom::Start(0)) {
                    log::warn!("Failed to rewind sample source: {err}");
                    break;
                }
                just_rewound = true;
            }
            Ok(read) => {
                filled += read;
                just_rewound = false;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                log::warn!("Sample source read failed: {err}");
                break;
            }
        }
    }

    buffer[filled..].fill(silence);
}

/// Wraps a shared source into a [`FillCallback`] that plays it in a loop.
pub fn looping_fill<S>(source: Arc<Mutex<S>>, silence: u8) -> FillCallback
where
    S: Read + Seek + Send + 'static,
{
    Box::new(move |buffer| {
        let mut source = source.lock().unwrap_or_else(PoisonError::into_inner);
        fill_looping(&mut *source, buffer, silence);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Fails every read after the first `ok_reads`.
    struct FailingSource {
        inner: Cursor<Vec<u8>>,
        ok_reads: usize,
    }

    impl Read for FailingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.ok_reads == 0 {
                return Err(io::Error::other("disk gone"));
            }
            self.ok_reads -= 1;
            self.inner.read(buf)
        }
    }

    impl Seek for FailingSource {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_short_source_repeats_within_one_buffer() {
        let mut source = Cursor::new(vec![1u8, 2, 3]);
        let mut buffer = [0u8; 8];

        fill_looping(&mut source, &mut buffer, 0x80);

        assert_eq!(buffer, [1, 2, 3, 1, 2, 3, 1, 2]);
        assert_eq!(source.position(), 2);
    }

    #[test]
    fn test_consecutive_fills_continue_where_the_last_stopped() {
        let mut source = Cursor::new((0u8..6).collect::<Vec<_>>());
        let mut first = [0u8; 4];
        let mut second = [0u8; 4];

        fill_looping(&mut source, &mut first, 0);
        fill_looping(&mut source, &mut second, 0);

        assert_eq!(first, [0, 1, 2, 3]);
        assert_eq!(second, [4, 5, 0, 1]);
    }

    #[test]
    fn test_empty_source_yields_silence() {
        let mut source = Cursor::new(Vec::new());
        let mut buffer = [0u8; 4];

        fill_looping(&mut source, &mut buffer, 0x80);

        assert_eq!(buffer, [0x80; 4]);
    }

    #[test]
    fn test_read_error_pads_with_silence() {
        let mut source = FailingSource {
            inner: Cursor::new(vec![9u8, 9]),
            ok_reads: 1,
        };
        let mut buffer = [1u8; 5];

        fill_looping(&mut source, &mut buffer, 0);

        assert_eq!(buffer, [9, 9, 0, 0, 0]);
    }

    #[test]
    fn test_looping_fill_shares_the_source_position() {
        let source = Arc::new(Mutex::new(Cursor::new(vec![7u8, 8, 9])));
        let mut fill = looping_fill(Arc::clone(&source), 0);
        let mut buffer = [0u8; 2];

        fill(&mut buffer);

        assert_eq!(buffer, [7, 8]);
        assert_eq!(source.lock().unwrap().position(), 2);
    }
}
