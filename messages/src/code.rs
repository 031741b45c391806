//! Message codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown message code: {0}")]
pub struct UnknownMessageCode(pub String);

macro_rules! message_codes {
    ($($variant:ident => $tag:tt,)*) => {
        /// All message codes in the protocol.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum MessageCode {
            $(#[serde(rename = $tag)] $variant,)*
        }

        impl MessageCode {
            pub const ALL: &'static [MessageCode] = &[$(MessageCode::$variant,)*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(MessageCode::$variant => $tag,)*
                }
            }
        }

        impl FromStr for MessageCode {
            type Err = UnknownMessageCode;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok(MessageCode::$variant),)*
                    other => Err(UnknownMessageCode(other.to_string())),
                }
            }
        }
    };
}

message_codes! {
    BootstrapJoinRequest => "BOOTSTRAP_JOIN_REQUEST",
    BootstrapJoinRequestAccepted => "BOOTSTRAP_JOIN_REQUEST_ACCEPTED",
    BootstrapJoinRequestRejected => "BOOTSTRAP_JOIN_REQUEST_REJECTED",
    JoinRequest => "JOIN_REQUEST",
    JoinRequestAccepted => "JOIN_REQUEST_ACCEPTED",
    JoinRequestRejected => "JOIN_REQUEST_REJECTED",
    RequestFullBlockchain => "REQUEST_FULL_BLOCKCHAIN",
    RequestBasicSnapshot => "REQUEST_BASIC_SNAPSHOT",
    SendFullBlockchain => "SEND_FULL_BLOCKCHAIN",
    SendBasicSnapshot => "SEND_BASIC_SNAPSHOT",
    ConnectionDiscovery => "CONNECTION_DISCOVERY",
    NodeDiscovery => "NODE_DISCOVERY",
    GlobalNodeDiscovery => "GLOBAL_NODE_DISCOVERY",
    Heartbeat => "HEARTBEAT",
    Ping => "PING",
    ProposeValidator => "PROPOSE_VALIDATOR",
    Text => "TEXT",
    Vote => "VOTE",
    NewBlockAdded => "NEW_BLOCK_ADDED",
    BecomeValidatorRequest => "BECOME_VALIDATOR_REQUEST",
    Proposal => "PROPOSAL",
}

impl MessageCode {
    /// Join-handshake codes whose envelopes are not checked against the peer
    /// directory. The sender is not known yet; handlers authenticate these
    /// against the key carried in the payload instead.
    pub fn is_handshake_exempt(&self) -> bool {
        matches!(
            self,
            MessageCode::BootstrapJoinRequest
                | MessageCode::BootstrapJoinRequestAccepted
                | MessageCode::BootstrapJoinRequestRejected
                | MessageCode::JoinRequest
                | MessageCode::JoinRequestAccepted
                | MessageCode::JoinRequestRejected
        )
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
