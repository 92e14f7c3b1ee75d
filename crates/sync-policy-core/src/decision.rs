//! Routing decisions: channels, access grants and the evaluator's verdict

use crate::error::Forbidden;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Channel name meaning "public, no restriction"
pub const WILDCARD_CHANNEL: &str = "!";

/// Prefix of per-owner channels
pub const OWNER_CHANNEL_PREFIX: &str = "channel.";

/// Replication channel identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    /// Wrap an arbitrary channel name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The public wildcard channel `!`
    pub fn wildcard() -> Self {
        Self(WILDCARD_CHANNEL.to_string())
    }

    /// The channel owned by `owner`: `channel.<owner>`
    pub fn for_owner(owner: &str) -> Self {
        Self(format!("{OWNER_CHANNEL_PREFIX}{owner}"))
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD_CHANNEL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read access to `channel` granted to `principal`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessGrant {
    pub principal: String,
    pub channel: Channel,
}

impl AccessGrant {
    pub fn new(principal: impl Into<String>, channel: Channel) -> Self {
        Self {
            principal: principal.into(),
            channel,
        }
    }
}

/// Outcome of evaluating one proposed revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    /// The write must not be stored or replicated
    Rejected(Forbidden),
    /// The write is permitted with these routing effects
    Accepted {
        channels: BTreeSet<Channel>,
        grants: Vec<AccessGrant>,
    },
}

impl Decision {
    /// Accept into a single channel with no grants
    pub fn route(channel: Channel) -> Self {
        Self::Accepted {
            channels: BTreeSet::from([channel]),
            grants: Vec::new(),
        }
    }

    /// Accept into the owner's channel and grant the owner access to it
    pub fn owned_by(owner: &str) -> Self {
        let channel = Channel::for_owner(owner);
        Self::Accepted {
            channels: BTreeSet::from([channel.clone()]),
            grants: vec![AccessGrant::new(owner, channel)],
        }
    }

    /// Accept without routing, leaving the tombstone to the gateway's defaults
    pub fn pass_through() -> Self {
        Self::Accepted {
            channels: BTreeSet::new(),
            grants: Vec::new(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Rejection, if any
    pub fn rejection(&self) -> Option<&Forbidden> {
        match self {
            Self::Rejected(forbidden) => Some(forbidden),
            Self::Accepted { .. } => None,
        }
    }

    /// Assigned channels (empty for rejections)
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        let channels = match self {
            Self::Accepted { channels, .. } => Some(channels),
            Self::Rejected(_) => None,
        };
        channels.into_iter().flatten()
    }

    /// Access grants (empty for rejections)
    pub fn grants(&self) -> &[AccessGrant] {
        match self {
            Self::Accepted { grants, .. } => grants,
            Self::Rejected(_) => &[],
        }
    }

    /// Label for metrics and logs
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected(_) => "rejected",
        }
    }

    /// Convert into a `Result`, surfacing the rejection as an error
    pub fn into_result(self) -> Result<(BTreeSet<Channel>, Vec<AccessGrant>), Forbidden> {
        match self {
            Self::Accepted { channels, grants } => Ok((channels, grants)),
            Self::Rejected(forbidden) => Err(forbidden),
        }
    }
}

impl From<Forbidden> for Decision {
    fn from(forbidden: Forbidden) -> Self {
        Self::Rejected(forbidden)
    }
}
