use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Messages accepted from clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
    Ping,
    /// Admin-originated change to relay to the other subscribers
    AdminUpdate {
        channel: String,
        entity: String,
        #[serde(default)]
        entity_id: Option<String>,
        action: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Joined,
    Left,
}

/// Change notification fanned out on admin channels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminUpdate {
    pub channel: String,
    pub entity: String,
    pub entity_id: Option<String>,
    pub action: String,
    pub payload: serde_json::Value,
    pub author_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl AdminUpdate {
    pub fn new(channel: Channel, entity: &str, entity_id: Option<Uuid>, action: &str) -> Self {
        Self {
            channel: channel.to_string(),
            entity: entity.to_string(),
            entity_id: entity_id.map(|id| id.to_string()),
            action: action.to_string(),
            payload: serde_json::Value::Null,
            author_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn author(mut self, author_id: Uuid) -> Self {
        self.author_id = Some(author_id);
        self
    }
}

/// Messages sent to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        connection_id: Uuid,
        user_id: Uuid,
        is_admin: bool,
    },
    Subscribed {
        channel: String,
    },
    Unsubscribed {
        channel: String,
    },
    Pong {
        timestamp: i64,
    },
    Presence {
        channel: String,
        user_id: Uuid,
        display_name: String,
        status: PresenceStatus,
    },
    AdminUpdate(AdminUpdate),
    /// Server-side notification for a single user (wallet credited, ...)
    Notification {
        event: String,
        data: serde_json::Value,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Channels a connection can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    AdminDashboard,
    AdminQuiz(Uuid),
    AdminWallets,
    Quiz(Uuid),
    User(Uuid),
}

impl Channel {
    /// Normalized channel name; ids are rendered lowercase and hyphenated
    pub fn canonical(s: &str) -> Result<String, String> {
        Ok(Self::parse(s)?.to_string())
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        let parse_id = |id: &str| {
            Uuid::parse_str(id).map_err(|_| format!("Invalid id in channel: {}", s))
        };

        match s.split(':').collect::<Vec<_>>().as_slice() {
            ["admin", "dashboard"] => Ok(Channel::AdminDashboard),
            ["admin", "wallets"] => Ok(Channel::AdminWallets),
            ["admin", "quiz", id] => Ok(Channel::AdminQuiz(parse_id(id)?)),
            ["quiz", id] => Ok(Channel::Quiz(parse_id(id)?)),
            ["user", id] => Ok(Channel::User(parse_id(id)?)),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Channel::AdminDashboard | Channel::AdminQuiz(_) | Channel::AdminWallets
        )
    }

    /// Whether a connection with this identity may join the channel
    pub fn authorize(&self, user_id: Uuid, is_admin: bool) -> Result<(), String> {
        match self {
            c if c.is_admin() && !is_admin => {
                Err("Admin session required for this channel".to_string())
            }
            Channel::User(owner) if *owner != user_id => {
                Err("Cannot subscribe to another user's channel".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::AdminDashboard => write!(f, "admin:dashboard"),
            Channel::AdminWallets => write!(f, "admin:wallets"),
            Channel::AdminQuiz(id) => write!(f, "admin:quiz:{}", id),
            Channel::Quiz(id) => write!(f, "quiz:{}", id),
            Channel::User(id) => write!(f, "user:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse_and_display() {
        let id = Uuid::new_v4();
        for raw in [
            "admin:dashboard".to_string(),
            "admin:wallets".to_string(),
            format!("admin:quiz:{}", id),
            format!("quiz:{}", id),
            format!("user:{}", id),
        ] {
            assert_eq!(Channel::parse(&raw).unwrap().to_string(), raw);
        }

        assert!(Channel::parse("event:123").is_err());
        assert!(Channel::parse("quiz:not-a-uuid").is_err());
        assert!(Channel::parse("admin").is_err());
    }

    #[test]
    fn test_channel_authorization() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(Channel::AdminDashboard.authorize(me, false).is_err());
        assert!(Channel::AdminDashboard.authorize(me, true).is_ok());
        assert!(Channel::User(me).authorize(me, false).is_ok());
        assert!(Channel::User(other).authorize(me, false).is_err());
        assert!(Channel::User(other).authorize(me, true).is_err());
        assert!(Channel::Quiz(other).authorize(me, false).is_ok());
    }

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","channel":"admin:dashboard"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { channel } if channel == "admin:dashboard"));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"admin_update","channel":"admin:wallets","entity":"wallet","action":"adjusted"}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::AdminUpdate { payload, .. } if payload.is_null()));
    }

    #[test]
    fn test_server_message_shape() {
        let json = serde_json::to_value(ServerMessage::Subscribed {
            channel: "admin:dashboard".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "subscribed");

        let update = AdminUpdate::new(Channel::AdminDashboard, "quiz", None, "created");
        let json = serde_json::to_value(ServerMessage::AdminUpdate(update)).unwrap();
        assert_eq!(json["type"], "admin_update");
        assert_eq!(json["channel"], "admin:dashboard");
        assert_eq!(json["action"], "created");
    }
}
