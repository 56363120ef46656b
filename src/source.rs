//! Buffer sources feeding the replay task.
//!
//! A source hands out raw byte buffers, each tagged with the preset
//! condition the acquisition-control layer attached to it. Buffers need not
//! be a multiple of four bytes; [`WordAssembler`] carries a partial trailing
//! word into the next buffer.

use crate::session::state::PresetSignal;
use bytes::{BufMut, Bytes, BytesMut};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tokio::sync::mpsc;

/// Bytes per list-mode word.
pub const WORD_BYTES: usize = 4;

/// One buffer of raw list-mode bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    /// Little-endian 32-bit words, possibly split at the edges
    pub bytes: Bytes,
    /// Preset condition delivered with the buffer
    pub preset: PresetSignal,
}

impl Buffer {
    /// Buffer without a preset condition.
    pub fn new(bytes: Bytes) -> Self {
        Self {
            bytes,
            preset: PresetSignal::None,
        }
    }

    /// Encode decoded words back into a buffer.
    pub fn from_words(words: &[i32], preset: PresetSignal) -> Self {
        let mut bytes = BytesMut::with_capacity(words.len() * WORD_BYTES);
        for word in words {
            bytes.put_i32_le(*word);
        }
        Self {
            bytes: bytes.freeze(),
            preset,
        }
    }
}

/// Producer of event buffers.
pub trait BufferSource: Send {
    /// Next buffer, `None` once the source is exhausted.
    fn next_buffer(&mut self) -> io::Result<Option<Buffer>>;
}

/// Reads a recorded list-mode stream in fixed-size buffers.
#[derive(Debug)]
pub struct FileSource<R> {
    reader: R,
    buffer_bytes: usize,
}

impl FileSource<BufReader<File>> {
    /// Open a list-mode file, reading `buffer_words` words at a time.
    pub fn open(path: impl AsRef<Path>, buffer_words: usize) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file), buffer_words))
    }
}

impl<R: Read> FileSource<R> {
    /// Wrap any reader.
    pub fn new(reader: R, buffer_words: usize) -> Self {
        Self {
            reader,
            buffer_bytes: buffer_words.max(1) * WORD_BYTES,
        }
    }
}

impl<R: Read + Send> BufferSource for FileSource<R> {
    fn next_buffer(&mut self) -> io::Result<Option<Buffer>> {
        let mut chunk = vec![0u8; self.buffer_bytes];
        let mut filled = 0;
        while filled < chunk.len() {
            match self.reader.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        chunk.truncate(filled);
        Ok(Some(Buffer::new(Bytes::from(chunk))))
    }
}

/// Receives buffers pushed by an online producer.
///
/// The source is exhausted once every sender is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Buffer>,
}

impl ChannelSource {
    /// Bounded channel of `capacity` buffers.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Buffer>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

impl BufferSource for ChannelSource {
    fn next_buffer(&mut self) -> io::Result<Option<Buffer>> {
        Ok(self.rx.blocking_recv())
    }
}

/// Turns byte buffers into words, carrying split words across buffers.
#[derive(Debug, Clone, Default)]
pub struct WordAssembler {
    carry: Vec<u8>,
}

impl WordAssembler {
    /// Append the complete words of `bytes` (after any carried bytes) to `out`.
    pub fn push(&mut self, bytes: &[u8], out: &mut Vec<i32>) {
        let mut rest = bytes;
        if !self.carry.is_empty() {
            let need = (WORD_BYTES - self.carry.len()).min(rest.len());
            self.carry.extend_from_slice(&rest[..need]);
            rest = &rest[need..];
            if self.carry.len() < WORD_BYTES {
                return;
            }
            out.push(le_word(&self.carry));
            self.carry.clear();
        }

        let mut words = rest.chunks_exact(WORD_BYTES);
        out.extend(words.by_ref().map(le_word));
        self.carry.extend_from_slice(words.remainder());
    }

    /// Bytes of an incomplete word waiting for the next buffer.
    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }
}

fn le_word(bytes: &[u8]) -> i32 {
    let mut word = [0u8; WORD_BYTES];
    word.copy_from_slice(&bytes[..WORD_BYTES]);
    i32::from_le_bytes(word)
}
