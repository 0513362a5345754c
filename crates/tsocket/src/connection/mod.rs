//! Live connections and the hub that routes outbound messages to them.

mod context;
mod hub;

pub use self::context::{ConnectionContext, EmitError};
pub use self::hub::{ConnectionHub, ConnectionId, OutboundReceiver, PeerAddr};
