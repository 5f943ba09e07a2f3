use lockstep_common::{ClientId, Command, Frame, LobbyInfo};
use lockstep_kernel::SyncReport;
use serde::{Deserialize, Serialize};

/// Errors from the network layer.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("CBOR encode error: {0}")]
    Encode(String),
    #[error("CBOR decode error: {0}")]
    Decode(String),
    #[error("hub has no client {0}")]
    UnknownClient(ClientId),
}

/// The serialized form exchanged between participants.
///
/// Transports may carry several commands per message, but each command
/// keeps its own target frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Handshake acknowledgement: the assigned id plus the current session
    /// snapshot.
    Welcome {
        client: ClientId,
        lobby: LobbyInfo,
    },
    Batch {
        client: ClientId,
        frame: Frame,
        commands: Vec<Command>,
    },
    Sync {
        client: ClientId,
        report: SyncReport,
    },
    Lobby(LobbyInfo),
    Drop {
        client: ClientId,
    },
}

impl WireMessage {
    pub fn encode(&self) -> Result<Vec<u8>, NetError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| NetError::Encode(e.to_string()))?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NetError> {
        ciborium::from_reader(bytes).map_err(|e| NetError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_roundtrip() {
        let msg = WireMessage::Batch {
            client: ClientId(2),
            frame: 17,
            commands: vec![
                Command::new(ClientId(2), 17, vec![1, 2, 3]),
                Command::noop(ClientId(2), 18),
            ],
        };
        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn batched_commands_keep_individual_frames() {
        let msg = WireMessage::Batch {
            client: ClientId(0),
            frame: 4,
            commands: vec![
                Command::noop(ClientId(0), 4),
                Command::noop(ClientId(0), 5),
            ],
        };
        let WireMessage::Batch { commands, .. } = WireMessage::decode(&msg.encode().unwrap()).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(commands[0].frame, 4);
        assert_eq!(commands[1].frame, 5);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(WireMessage::decode(&[0x9f, 0x9f, 0xff]).is_err());
    }
}
