//! # Delivery routing
//!
//! A record addressed to the group identity fans out to every registered
//! connection, the sender's own included. Anything else goes to the single
//! connection of the named recipient, if they are online.
//!
//! Delivery is best-effort. Each send is independent: a dead recipient never
//! stops delivery to the others and nothing is reported back to the sender.
//! Offline recipients pick the record up from history, since it was
//! persisted before routing.

use crate::record::MessageRecord;
use crate::registry::ConnectionRegistry;

/// Where a record was routed and how the individual sends went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Group broadcast to a snapshot of the registry.
    Broadcast { delivered: usize, failed: usize },
    /// Direct message to an online recipient.
    Direct { delivered: bool },
    /// Recipient not connected; persisted only.
    Offline,
}

/// Route `record` to its live recipient(s).
///
/// Send failures are counted in the returned [`Delivery`] and otherwise
/// discarded; callers use it for logging only.
pub fn deliver(registry: &ConnectionRegistry, group: &str, record: &MessageRecord) -> Delivery {
    let frame = record.to_wire();

    match record.to() {
        Some(to) if to == group => {
            let mut delivered = 0;
            let mut failed = 0;
            for conn in registry.snapshot() {
                match conn.try_send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => failed += 1,
                }
            }
            Delivery::Broadcast { delivered, failed }
        }
        Some(to) => match registry.get(to) {
            Some(conn) => Delivery::Direct {
                delivered: conn.try_send(frame).is_ok(),
            },
            None => Delivery::Offline,
        },
        None => Delivery::Offline,
    }
}
