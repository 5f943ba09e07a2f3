use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use lockstep_common::Frame;
use tracing::{debug, warn};

use crate::format::{cbor_encode, ReplayError, ReplayHeader, ReplayRecord, FORMAT_VERSION, MAGIC};

/// Appends committed frames to a replay file as they happen.
///
/// Each record is flushed as soon as it is written, so a crash loses at most
/// the record being written. Playback tolerates that torn tail.
pub struct ReplayWriter {
    out: BufWriter<File>,
    last_frame: Option<Frame>,
    records: u64,
}

impl ReplayWriter {
    /// Create a replay file and write its header.
    pub fn create(path: impl AsRef<Path>, header: &ReplayHeader) -> Result<Self, ReplayError> {
        let mut out = BufWriter::new(File::create(path.as_ref())?);
        out.write_all(MAGIC)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;
        write_block(&mut out, &cbor_encode(header)?)?;
        out.flush()?;
        debug!(path = %path.as_ref().display(), game_id = %header.game_id, "replay recording started");
        Ok(Self {
            out,
            last_frame: None,
            records: 0,
        })
    }

    /// Append one committed frame.
    ///
    /// Frames must arrive in strictly ascending order; the commit path only
    /// moves forward, so anything else is a caller bug.
    pub fn append(&mut self, record: &ReplayRecord) -> Result<(), ReplayError> {
        if let Some(last) = self.last_frame {
            if record.frame <= last {
                return Err(ReplayError::NonMonotonicFrame {
                    frame: record.frame,
                    last,
                });
            }
        }
        write_block(&mut self.out, &cbor_encode(record)?)?;
        self.out.flush()?;
        self.last_frame = Some(record.frame);
        self.records += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Flush and close the file.
    pub fn finalize(mut self) -> Result<(), ReplayError> {
        self.out.flush()?;
        debug!(records = self.records, "replay recording finalized");
        Ok(())
    }
}

impl Drop for ReplayWriter {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            warn!(error = %e, "failed to flush replay on drop");
        }
    }
}

fn write_block(out: &mut impl Write, bytes: &[u8]) -> Result<(), ReplayError> {
    out.write_all(&(bytes.len() as u32).to_le_bytes())?;
    out.write_all(bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_common::{Client, ClientId, Command};

    fn header() -> ReplayHeader {
        ReplayHeader::new(42, "0.1.0", vec![Client::new(ClientId(0), "host")])
    }

    #[test]
    fn file_starts_with_magic_and_version() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.replay");
        ReplayWriter::create(&path, &header()).unwrap().finalize().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[..4], MAGIC);
        assert_eq!(u32::from_le_bytes([data[4], data[5], data[6], data[7]]), FORMAT_VERSION);
    }

    #[test]
    fn append_rejects_non_monotonic_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = ReplayWriter::create(tmp.path().join("a.replay"), &header()).unwrap();

        writer
            .append(&ReplayRecord {
                frame: 2,
                commands: vec![Command::noop(ClientId(0), 2)],
            })
            .unwrap();
        let result = writer.append(&ReplayRecord {
            frame: 2,
            commands: Vec::new(),
        });
        assert!(matches!(
            result,
            Err(ReplayError::NonMonotonicFrame { frame: 2, last: 2 })
        ));
        assert_eq!(writer.records_written(), 1);
    }
}
