//! Inbound message classification.
//!
//! Engine notifications arrive as raw [`EngineMessage`] frames. The
//! dispatcher classifies each frame into an [`Inbound`] variant before
//! routing; anything that does not classify is dropped by the router.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use crate::identifiers::{DocHandle, SyncId};

use super::message::{Arg, CMD_OPEN_FAILED, CMD_OPENED, CMD_REPLY, EngineMessage};

// ============================================================================
// Inbound
// ============================================================================

/// A classified inbound message from the engine.
///
/// Note the two correlation keys: open notifications are keyed by document
/// path, query replies by sync id. This asymmetry is part of the wire
/// contract and is mirrored by the dispatcher's two lookup tables.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The engine opened a document and assigned it a handle.
    OpenSucceeded {
        /// Path of the opened document.
        path: PathBuf,
        /// Opaque remote handle for subsequent instructions.
        handle: DocHandle,
    },

    /// The engine could not open a document.
    OpenFailed {
        /// Path of the rejected document.
        path: PathBuf,
    },

    /// Reply to an outstanding query.
    QueryReply {
        /// Echoed correlation token; high bits name the owning slot.
        sync_id: SyncId,
        /// Property values in the order the query named them.
        values: Vec<Arg>,
    },
}

impl Inbound {
    /// Classifies a raw engine message.
    ///
    /// Returns `None` for unknown commands or malformed argument lists;
    /// the caller drops those (the owning worker times out on its own).
    #[must_use]
    pub fn classify(message: EngineMessage) -> Option<Self> {
        match message.command.as_str() {
            CMD_OPENED => {
                let path = message.args.first()?.as_str()?;
                let handle = message.args.get(1)?.as_str()?;
                Some(Self::OpenSucceeded {
                    path: PathBuf::from(path),
                    handle: DocHandle::new(handle),
                })
            }

            CMD_OPEN_FAILED => {
                let path = message.args.first()?.as_str()?;
                Some(Self::OpenFailed {
                    path: PathBuf::from(path),
                })
            }

            CMD_REPLY => {
                let raw = message.args.first()?.as_i64()?;
                let sync_id = SyncId::from_raw(u32::try_from(raw).ok()?);
                let values = message.args.into_iter().skip(1).collect();
                Some(Self::QueryReply { sync_id, values })
            }

            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::SlotId;
    use crate::protocol::message::EngineMessage;

    #[test]
    fn test_classify_open_succeeded() {
        let msg = EngineMessage::new(
            CMD_OPENED,
            vec![Arg::from("/tmp/a.job"), Arg::from("doc-3")],
        );

        let inbound = Inbound::classify(msg).expect("classified");
        assert_eq!(
            inbound,
            Inbound::OpenSucceeded {
                path: PathBuf::from("/tmp/a.job"),
                handle: DocHandle::new("doc-3"),
            }
        );
    }

    #[test]
    fn test_classify_open_failed() {
        let msg = EngineMessage::new(CMD_OPEN_FAILED, vec![Arg::from("/tmp/a.job")]);

        let inbound = Inbound::classify(msg).expect("classified");
        assert_eq!(
            inbound,
            Inbound::OpenFailed {
                path: PathBuf::from("/tmp/a.job"),
            }
        );
    }

    #[test]
    fn test_classify_query_reply() {
        let sync_id = SyncId::pack(SlotId::new(1).unwrap(), 2);
        let msg = EngineMessage::new(
            CMD_REPLY,
            vec![
                Arg::Int(i64::from(sync_id.raw())),
                Arg::Bool(true),
                Arg::Float(0.25),
                Arg::from(""),
            ],
        );

        let inbound = Inbound::classify(msg).expect("classified");
        match inbound {
            Inbound::QueryReply { sync_id: id, values } => {
                assert_eq!(id, sync_id);
                assert_eq!(values.len(), 3);
                assert_eq!(values[0].as_bool(), Some(true));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_dropped() {
        let msg = EngineMessage::new("/doc/renamed", vec![]);
        assert!(Inbound::classify(msg).is_none());
    }

    #[test]
    fn test_malformed_args_dropped() {
        // opened without a handle
        let msg = EngineMessage::new(CMD_OPENED, vec![Arg::from("/tmp/a.job")]);
        assert!(Inbound::classify(msg).is_none());

        // reply with non-integer sync id
        let msg = EngineMessage::new(CMD_REPLY, vec![Arg::from("nope")]);
        assert!(Inbound::classify(msg).is_none());

        // reply with negative sync id
        let msg = EngineMessage::new(CMD_REPLY, vec![Arg::Int(-1)]);
        assert!(Inbound::classify(msg).is_none());
    }
}
