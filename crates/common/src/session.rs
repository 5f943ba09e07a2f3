use serde::{Deserialize, Serialize};

use crate::types::{ClientId, ConnectionState};

/// A participant in the session roster.
///
/// Mutated only through lobby-synchronization snapshots; `index` is
/// immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub index: ClientId,
    pub name: String,
    pub color: [u8; 3],
    pub team: u8,
    pub spawn_point: u8,
    pub state: ConnectionState,
    pub is_admin: bool,
    pub is_bot: bool,
}

impl Client {
    /// A minimal human participant entry, as created when joining a lobby.
    pub fn new(index: ClientId, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            color: [255, 255, 255],
            team: 0,
            spawn_point: 0,
            state: ConnectionState::Connected,
            is_admin: false,
            is_bot: false,
        }
    }
}

/// A serialized snapshot of the session state.
///
/// Broadcast whole to all participants whenever mutated; receivers replace
/// their copy in one assignment so no partial roster is ever observable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyInfo {
    /// Seed for the simulation-shared random generator.
    pub seed: u64,
    pub clients: Vec<Client>,
}

impl LobbyInfo {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clients: Vec::new(),
        }
    }

    pub fn client(&self, index: ClientId) -> Option<&Client> {
        self.clients.iter().find(|c| c.index == index)
    }

    pub fn client_mut(&mut self, index: ClientId) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.index == index)
    }

    /// Participants expected to submit commands each frame.
    ///
    /// Disconnected participants are excluded; bots submit through their
    /// host and count like any other client.
    pub fn active_clients(&self) -> impl Iterator<Item = &Client> {
        self.clients
            .iter()
            .filter(|c| c.state != ConnectionState::NotConnected)
    }
}
