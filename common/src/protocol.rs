use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::frame::{read_frame, write_frame};

/// Messages exchanged on the supervisor control plane.
///
/// The control plane is a loopback channel between the supervisor and its
/// client-role nodes; commands ride the same length-prefixed framing as the
/// data plane, encoded with bincode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// A client-role node announcing itself to the supervisor.
    Subscribe {
        /// Name the node is managed under
        node: String,
    },
    /// Supervisor acknowledgement of a subscription.
    Subscribed,
    /// Instruction to re-establish the channel to the server peer now.
    Reconnect,
}

/// Write one control message as a framed bincode payload.
pub fn write_message<W: Write>(w: &mut W, msg: &ControlMessage) -> io::Result<()> {
    let encoded =
        bincode::serialize(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_frame(w, &encoded)
}

/// Read one control message; `Ok(None)` on clean end of stream.
pub fn read_message<R: Read>(r: &mut R) -> io::Result<Option<ControlMessage>> {
    match read_frame(r)? {
        Some(body) => bincode::deserialize(&body)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn control_messages_roundtrip() {
        let messages = [
            ControlMessage::Subscribe {
                node: "log-process".to_string(),
            },
            ControlMessage::Subscribed,
            ControlMessage::Reconnect,
        ];

        let mut wire = Vec::new();
        for msg in &messages {
            write_message(&mut wire, msg).unwrap();
        }

        let mut cursor = Cursor::new(wire);
        for msg in &messages {
            assert_eq!(read_message(&mut cursor).unwrap().as_ref(), Some(msg));
        }
        assert_eq!(read_message(&mut cursor).unwrap(), None);
    }

    #[test]
    fn garbage_payload_is_invalid_data() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"\xff\xff\xff\xff\xff").unwrap();

        let err = read_message(&mut Cursor::new(wire)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
