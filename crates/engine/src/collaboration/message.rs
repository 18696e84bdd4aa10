use serde::{Deserialize, Serialize};

use crate::commands::Command;

/// Messages exchanged between collaborating models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaborationMessage {
    RemoteRevision(RemoteRevision),
    ClientLeft(ClientLeft),
}

impl CollaborationMessage {
    /// Client that produced the message.
    pub fn client_id(&self) -> &str {
        match self {
            CollaborationMessage::RemoteRevision(r) => &r.client_id,
            CollaborationMessage::ClientLeft(l) => &l.client_id,
        }
    }
}

/// A revision as broadcast by its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRevision {
    pub client_id: String,
    /// Per-author counter starting at 0; receivers apply in this order.
    pub sequence: u64,
    pub revision_id: String,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientLeft {
    pub client_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_id::SheetId;

    #[test]
    fn test_message_json_shape() {
        let msg = CollaborationMessage::RemoteRevision(RemoteRevision {
            client_id: "alice".into(),
            sequence: 3,
            revision_id: "r-9".into(),
            commands: vec![Command::update_content(SheetId::new("s1"), 0, 0, "1")],
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "REMOTE_REVISION");
        assert_eq!(json["clientId"], "alice");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json["commands"][0]["type"], "UPDATE_CELL");

        let back: CollaborationMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.client_id(), "alice");
    }
}
