//! Host/Client role.

use serde::{Deserialize, Serialize};

use crate::transport::LinkState;

/// Which side of a peer session this device is on.
///
/// The device holding a `Ready` printer link is the host; every other device
/// forwards its jobs to a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    #[default]
    Client,
}

impl Role {
    pub fn for_link(state: LinkState) -> Self {
        if state == LinkState::Ready {
            Self::Host
        } else {
            Self::Client
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Client => "client",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "host" => Some(Self::Host),
            "client" => Some(Self::Client),
            _ => None,
        }
    }

    /// The role a session partner must have.
    pub fn counterpart(&self) -> Self {
        match self {
            Self::Host => Self::Client,
            Self::Client => Self::Host,
        }
    }

    /// Clients pair with hosts and hosts with clients, never like with like.
    pub fn pairs_with(&self, other: Role) -> bool {
        other == self.counterpart()
    }

    /// Status line shown while no peer is connected.
    pub fn waiting_message(&self) -> &'static str {
        match self {
            Self::Host => "Waiting for clients…",
            Self::Client => "Looking for host…",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
