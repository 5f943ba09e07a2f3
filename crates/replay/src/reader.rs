use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use lockstep_common::Frame;
use tracing::{debug, warn};

use crate::format::{cbor_decode, ReplayError, ReplayHeader, ReplayRecord, FORMAT_VERSION, MAGIC};

/// Sequential reader over a replay file.
///
/// Validates magic and format version up front and enforces that records
/// cover consecutive frames. A file with a frame gap cannot be replayed
/// deterministically and is rejected at the gap, not at open time, so
/// everything before the gap is still inspectable.
pub struct ReplayReader {
    input: BufReader<File>,
    header: ReplayHeader,
    last_frame: Option<Frame>,
}

impl ReplayReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let mut input = BufReader::new(File::open(path.as_ref())?);

        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ReplayError::BadMagic);
        }
        let mut version = [0u8; 4];
        input.read_exact(&mut version)?;
        let file_version = u32::from_le_bytes(version);
        if file_version != FORMAT_VERSION {
            return Err(ReplayError::FormatMismatch {
                file_version,
                expected_version: FORMAT_VERSION,
            });
        }

        let header_bytes = read_block(&mut input)?.ok_or(ReplayError::BadMagic)?;
        let header: ReplayHeader = cbor_decode(&header_bytes)?;
        debug!(game_id = %header.game_id, seed = header.seed, "replay opened");

        Ok(Self {
            input,
            header,
            last_frame: None,
        })
    }

    pub fn header(&self) -> &ReplayHeader {
        &self.header
    }

    /// Read the next record, or `None` at end of file.
    ///
    /// A truncated trailing record (crash while recording) is logged and
    /// treated as end of file. A frame gap is an error.
    pub fn next_record(&mut self) -> Result<Option<ReplayRecord>, ReplayError> {
        let Some(bytes) = read_block(&mut self.input)? else {
            return Ok(None);
        };
        let record: ReplayRecord = cbor_decode(&bytes)?;
        if let Some(last) = self.last_frame {
            if record.frame != last + 1 {
                return Err(ReplayError::MissingFrame {
                    expected: last + 1,
                    found: record.frame,
                });
            }
        }
        self.last_frame = Some(record.frame);
        Ok(Some(record))
    }
}

/// Read one length-prefixed block. `None` means clean end of file; a
/// partially written block is downgraded to end of file with a warning.
fn read_block(input: &mut impl Read) -> Result<Option<Vec<u8>>, ReplayError> {
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < len_bytes.len() {
        let n = input.read(&mut len_bytes[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            warn!("replay ends mid-record, treating as end of file");
            return Ok(None);
        }
        filled += n;
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    match input.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            warn!("replay ends mid-record, treating as end of file");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
