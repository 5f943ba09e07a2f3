use lockstep_common::{Client, Command, Frame};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Magic bytes at the start of every replay file.
pub const MAGIC: &[u8; 4] = b"LSRP";

/// Current replay format version.
pub const FORMAT_VERSION: u32 = 1;

/// Errors from replay recording and playback.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("not a replay file (bad magic)")]
    BadMagic,
    #[error("replay format mismatch: file has v{file_version}, expected v{expected_version}")]
    FormatMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("frame {frame} is not after last written frame {last}")]
    NonMonotonicFrame { frame: Frame, last: Frame },
    #[error("replay is missing frame {expected}, found {found} instead")]
    MissingFrame { expected: Frame, found: Frame },
}

/// Replay file header, written once at the start of the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayHeader {
    pub game_id: Uuid,
    /// Seed for the simulation-shared random generator.
    pub seed: u64,
    /// Version string of the engine that recorded the file. Deterministic
    /// playback is only guaranteed on the same version; a mismatch is
    /// reported but does not refuse playback.
    pub engine_version: String,
    /// Roster at recording start. Playback synthesizes batches for exactly
    /// these participants.
    pub clients: Vec<Client>,
}

impl ReplayHeader {
    pub fn new(seed: u64, engine_version: impl Into<String>, clients: Vec<Client>) -> Self {
        Self {
            game_id: Uuid::new_v4(),
            seed,
            engine_version: engine_version.into(),
            clients,
        }
    }
}

/// One committed frame: the complete command list it executed, in commit
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub frame: Frame,
    pub commands: Vec<Command>,
}

pub(crate) fn cbor_encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ReplayError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| ReplayError::CborEncode(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn cbor_decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ReplayError> {
    ciborium::from_reader(data).map_err(|e| ReplayError::CborDecode(e.to_string()))
}
