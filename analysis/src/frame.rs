//! Streaming decoder for the demo container.
//!
//! ```text
//! header := magic[8] version:u16 tick_rate:u16 map_len:u8 map[map_len]
//! frame  := kind:u8 len:u32 payload[len]
//! ```
//!
//! All integers are little endian. The stream must end with a `Command`
//! frame carrying [`CMD_STOP`], anything else is reported as a truncated
//! frame.

use std::io::{BufReader, Read};

pub const MAGIC: [u8; 8] = *b"DEMSTRM\0";
pub const FORMAT_VERSION: u16 = 1;

/// Number of bytes needed by [`Header::check_prefix`].
pub const PREFIX_LEN: usize = MAGIC.len() + 2;

pub const CMD_STOP: u8 = 0x00;

pub const TAG_COMMAND: u8 = 0x01;
pub const TAG_MESSAGE: u8 = 0x02;
pub const TAG_STRING_TABLE: u8 = 0x03;
pub const TAG_TICK: u8 = 0x04;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported version {0}")]
    UnsupportedVersion(u16),
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),
    #[error("truncated frame at offset {offset}")]
    TruncatedFrame { offset: u64 },
    #[error("frame at offset {offset} declares {len} bytes")]
    FrameTooLarge { offset: u64, len: u32 },
    #[error("malformed {kind:?} frame at offset {offset}")]
    MalformedFrame { kind: FrameKind, offset: u64 },
    #[error("malformed event {event_type} at offset {offset}")]
    MalformedEvent { event_type: u8, offset: u64 },
    #[error("reading demo: {0}")]
    Io(String),
}

impl FormatError {
    /// Short machine readable reason, independent of offsets.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::BadMagic => "bad magic",
            Self::UnsupportedVersion(_) => "unsupported version",
            Self::MalformedHeader(_) => "malformed header",
            Self::TruncatedFrame { .. } => "truncated frame",
            Self::FrameTooLarge { .. } => "frame too large",
            Self::MalformedFrame { .. } => "malformed frame",
            Self::MalformedEvent { .. } => "malformed event",
            Self::Io(_) => "io",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Command,
    Message,
    StringTable,
    Tick,
    Unknown(u8),
}

impl FrameKind {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            TAG_COMMAND => Self::Command,
            TAG_MESSAGE => Self::Message,
            TAG_STRING_TABLE => Self::StringTable,
            TAG_TICK => Self::Tick,
            other => Self::Unknown(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Command => TAG_COMMAND,
            Self::Message => TAG_MESSAGE,
            Self::StringTable => TAG_STRING_TABLE,
            Self::Tick => TAG_TICK,
            Self::Unknown(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub kind: FrameKind,
    /// Offset of the frame header in the stream.
    pub offset: u64,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn is_stop(&self) -> bool {
        self.kind == FrameKind::Command && self.payload.first() == Some(&CMD_STOP)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub tick_rate: u16,
    pub map_name: String,
}

impl Header {
    /// Validates magic and version on the first bytes of a stream.
    pub fn check_prefix(buf: &[u8]) -> Result<(), FormatError> {
        if buf.len() < MAGIC.len() || buf[..MAGIC.len()] != MAGIC {
            return Err(FormatError::BadMagic);
        }
        if buf.len() < PREFIX_LEN {
            return Err(FormatError::MalformedHeader("missing version"));
        }

        let version = u16::from_le_bytes([buf[MAGIC.len()], buf[MAGIC.len() + 1]]);
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        Ok(())
    }

    fn read<R: Read>(reader: &mut R) -> Result<(Self, u64), FormatError> {
        let mut prefix = [0u8; PREFIX_LEN];
        let read = read_full(reader, &mut prefix)?;
        Self::check_prefix(&prefix[..read])?;

        let mut rest = [0u8; 3];
        if read_full(reader, &mut rest)? != rest.len() {
            return Err(FormatError::MalformedHeader("missing tick rate"));
        }
        let tick_rate = u16::from_le_bytes([rest[0], rest[1]]);

        let mut name = vec![0u8; rest[2] as usize];
        if read_full(reader, &mut name)? != name.len() {
            return Err(FormatError::MalformedHeader("missing map name"));
        }
        let map_name = String::from_utf8(name)
            .map_err(|_| FormatError::MalformedHeader("map name is not utf-8"))?;

        let consumed = (PREFIX_LEN + rest.len() + map_name.len()) as u64;
        Ok((
            Self {
                version: FORMAT_VERSION,
                tick_rate,
                map_name,
            },
            consumed,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_frame_len: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_len: 16 * 1024 * 1024,
        }
    }
}

/// Pull based frame reader over any byte source.
///
/// Only the current offset and the [`BufReader`] buffer are kept, so memory
/// use is bounded by the largest frame regardless of the file size.
pub struct DemoReader<R> {
    reader: BufReader<R>,
    header: Header,
    limits: Limits,
    offset: u64,
    frames: u64,
    skipped: u64,
    done: bool,
}

/// Opens a demo stream and validates its header.
pub fn decode<R: Read>(reader: R) -> Result<DemoReader<R>, FormatError> {
    DemoReader::with_limits(reader, Limits::default())
}

impl<R: Read> DemoReader<R> {
    pub fn with_limits(reader: R, limits: Limits) -> Result<Self, FormatError> {
        let mut reader = BufReader::new(reader);
        let (header, offset) = Header::read(&mut reader)?;

        tracing::debug!(map = %header.map_name, tick_rate = header.tick_rate, "Read demo header");

        Ok(Self {
            reader,
            header,
            limits,
            offset,
            frames: 0,
            skipped: 0,
            done: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Frames handed out so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames of unknown kind that were skipped.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn next_frame(&mut self) -> Result<RawFrame, FormatError> {
        loop {
            let start = self.offset;

            let mut head = [0u8; 5];
            match read_full(&mut self.reader, &mut head)? {
                5 => {}
                // The stream ended without a stop command
                _ => return Err(FormatError::TruncatedFrame { offset: start }),
            }
            self.offset += head.len() as u64;

            let kind = FrameKind::from_tag(head[0]);
            let len = u32::from_le_bytes([head[1], head[2], head[3], head[4]]);
            if len > self.limits.max_frame_len {
                return Err(FormatError::FrameTooLarge { offset: start, len });
            }

            if let FrameKind::Unknown(tag) = kind {
                let skipped = std::io::copy(
                    &mut (&mut self.reader).take(len as u64),
                    &mut std::io::sink(),
                )
                .map_err(|e| FormatError::Io(e.to_string()))?;
                if skipped != len as u64 {
                    return Err(FormatError::TruncatedFrame { offset: start });
                }

                tracing::trace!(tag, len, offset = start, "Skipping unknown frame");
                self.offset += skipped;
                self.skipped += 1;
                continue;
            }

            let mut payload = Vec::with_capacity(len as usize);
            (&mut self.reader)
                .take(len as u64)
                .read_to_end(&mut payload)
                .map_err(|e| FormatError::Io(e.to_string()))?;
            if payload.len() != len as usize {
                return Err(FormatError::TruncatedFrame { offset: start });
            }
            self.offset += len as u64;
            self.frames += 1;

            return Ok(RawFrame {
                kind,
                offset: start,
                payload,
            });
        }
    }
}

impl<R: Read> Iterator for DemoReader<R> {
    type Item = Result<RawFrame, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.next_frame() {
            Ok(frame) => {
                if frame.is_stop() {
                    self.done = true;
                }
                Some(Ok(frame))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Reads until `buf` is full or the source is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, FormatError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FormatError::Io(e.to_string())),
        }
    }
    Ok(filled)
}
