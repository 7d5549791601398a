use super::messages::{AdminUpdate, Channel, ClientMessage, PresenceStatus, ServerMessage};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Identity of an authenticated socket
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub user_id: Uuid,
    pub display_name: String,
    pub is_admin: bool,
}

struct Connection {
    info: ConnectionInfo,
    sender: mpsc::UnboundedSender<ServerMessage>,
    channels: HashSet<String>,
}

#[derive(Default)]
struct HubState {
    /// channel -> subscribed connection ids
    channels: HashMap<String, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, Connection>,
}

impl HubState {
    fn send_to_channel(
        &self,
        channel: &str,
        message: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let Some(members) = self.channels.get(channel) else {
            return 0;
        };

        let mut delivered = 0;
        for id in members {
            if Some(*id) == exclude {
                continue;
            }
            if let Some(conn) = self.connections.get(id) {
                if conn.sender.send(message.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    fn remove_member(&mut self, conn_id: ConnectionId, channel: &str) -> bool {
        let removed = match self.channels.get_mut(channel) {
            Some(members) => members.remove(&conn_id),
            None => false,
        };
        if self.channels.get(channel).is_some_and(|m| m.is_empty()) {
            self.channels.remove(channel);
        }
        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.channels.remove(channel);
        }
        removed
    }

    /// Presence is announced for admins on admin channels
    fn announce_presence(&self, conn_id: ConnectionId, channel: &str, status: PresenceStatus) {
        let Some(conn) = self.connections.get(&conn_id) else {
            return;
        };
        let is_admin_channel = Channel::parse(channel).map(|c| c.is_admin()).unwrap_or(false);
        if !conn.info.is_admin || !is_admin_channel {
            return;
        }

        let message = ServerMessage::Presence {
            channel: channel.to_string(),
            user_id: conn.info.user_id,
            display_name: conn.info.display_name.clone(),
            status,
        };
        self.send_to_channel(channel, &message, Some(conn_id));
    }
}

/// Distinct user present on a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelMember {
    pub user_id: Uuid,
    pub display_name: String,
    pub is_admin: bool,
}

/// In-process registry of sockets and their channel memberships
#[derive(Default)]
pub struct WsHub {
    state: RwLock<HubState>,
}

impl WsHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection; messages for it are pushed into `sender`
    pub async fn register(
        &self,
        info: ConnectionInfo,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> ConnectionId {
        let id = Uuid::new_v4();
        let welcome = ServerMessage::Connected {
            connection_id: id,
            user_id: info.user_id,
            is_admin: info.is_admin,
        };
        let _ = sender.send(welcome);

        let mut state = self.state.write().await;
        state.connections.insert(
            id,
            Connection {
                info,
                sender,
                channels: HashSet::new(),
            },
        );
        debug!("Registered WebSocket connection {}", id);
        id
    }

    /// Drop a connection from every channel, announcing departures
    pub async fn unregister(&self, conn_id: ConnectionId) {
        let mut state = self.state.write().await;
        let channels: Vec<String> = match state.connections.get(&conn_id) {
            Some(conn) => conn.channels.iter().cloned().collect(),
            None => return,
        };

        for channel in &channels {
            state.remove_member(conn_id, channel);
            state.announce_presence(conn_id, channel, PresenceStatus::Left);
        }
        state.connections.remove(&conn_id);
        info!(
            "WebSocket connection {} closed ({} channel(s) left)",
            conn_id,
            channels.len()
        );
    }

    /// Join a channel after checking the connection may see it
    ///
    /// Returns the canonical channel name the connection is now a member of.
    pub async fn subscribe(&self, conn_id: ConnectionId, channel: &str) -> Result<String, String> {
        let parsed = Channel::parse(channel)?;
        let canonical = parsed.to_string();

        let mut state = self.state.write().await;
        let conn = state
            .connections
            .get_mut(&conn_id)
            .ok_or_else(|| "Unknown connection".to_string())?;
        parsed.authorize(conn.info.user_id, conn.info.is_admin)?;

        if !conn.channels.insert(canonical.clone()) {
            return Ok(canonical);
        }
        state
            .channels
            .entry(canonical.clone())
            .or_default()
            .insert(conn_id);
        state.announce_presence(conn_id, &canonical, PresenceStatus::Joined);

        debug!("Connection {} subscribed to {}", conn_id, canonical);
        Ok(canonical)
    }

    /// Leave a channel; `Ok(false)` when the connection was not a member
    pub async fn unsubscribe(&self, conn_id: ConnectionId, channel: &str) -> Result<bool, String> {
        let canonical = Channel::canonical(channel)?;
        let mut state = self.state.write().await;
        let removed = state.remove_member(conn_id, &canonical);
        if removed {
            // Still registered, so `announce_presence` can find the sender info
            state.announce_presence(conn_id, &canonical, PresenceStatus::Left);
        }
        Ok(removed)
    }

    /// Fan an admin update out to the channel, skipping `exclude`
    pub async fn publish_admin_update(
        &self,
        update: AdminUpdate,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let channel = update.channel.clone();
        let state = self.state.read().await;
        let delivered =
            state.send_to_channel(&channel, &ServerMessage::AdminUpdate(update), exclude);
        debug!("admin_update on {} delivered to {} subscriber(s)", channel, delivered);
        delivered
    }

    /// Push a notification to every connection subscribed to `user:{id}`
    pub async fn notify_user(&self, user_id: Uuid, event: &str, data: serde_json::Value) -> usize {
        let message = ServerMessage::Notification {
            event: event.to_string(),
            data,
        };
        let state = self.state.read().await;
        state.send_to_channel(&Channel::User(user_id).to_string(), &message, None)
    }

    /// Distinct users currently subscribed to a channel
    pub async fn channel_members(&self, channel: &str) -> Vec<ChannelMember> {
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        let mut members: Vec<ChannelMember> = state
            .channels
            .get(channel)
            .into_iter()
            .flatten()
            .filter_map(|id| state.connections.get(id))
            .filter(|conn| seen.insert(conn.info.user_id))
            .map(|conn| ChannelMember {
                user_id: conn.info.user_id,
                display_name: conn.info.display_name.clone(),
                is_admin: conn.info.is_admin,
            })
            .collect();
        members.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        members
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Queue a message for a single connection
    pub async fn send_to(&self, conn_id: ConnectionId, message: ServerMessage) {
        let state = self.state.read().await;
        if let Some(conn) = state.connections.get(&conn_id) {
            let _ = conn.sender.send(message);
        }
    }

    /// Apply one client message on behalf of a connection
    pub async fn handle_client_message(&self, conn_id: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::Subscribe { channel } => {
                let reply = match self.subscribe(conn_id, &channel).await {
                    Ok(canonical) => ServerMessage::Subscribed { channel: canonical },
                    Err(reason) => {
                        warn!("Connection {} denied {}: {}", conn_id, channel, reason);
                        ServerMessage::error(reason)
                    }
                };
                self.send_to(conn_id, reply).await;
            }
            ClientMessage::Unsubscribe { channel } => {
                let reply = match Channel::canonical(&channel) {
                    Ok(canonical) => {
                        let _ = self.unsubscribe(conn_id, &canonical).await;
                        ServerMessage::Unsubscribed { channel: canonical }
                    }
                    Err(reason) => ServerMessage::error(reason),
                };
                self.send_to(conn_id, reply).await;
            }
            ClientMessage::Ping => {
                let pong = ServerMessage::Pong {
                    timestamp: chrono::Utc::now().timestamp_millis(),
                };
                self.send_to(conn_id, pong).await;
            }
            ClientMessage::AdminUpdate {
                channel,
                entity,
                entity_id,
                action,
                payload,
            } => {
                let channel = match Channel::canonical(&channel) {
                    Ok(canonical) => canonical,
                    Err(reason) => {
                        self.send_to(conn_id, ServerMessage::error(reason)).await;
                        return;
                    }
                };
                let author = {
                    let state = self.state.read().await;
                    state.connections.get(&conn_id).map(|conn| {
                        (
                            conn.info.user_id,
                            conn.info.is_admin,
                            conn.channels.contains(&channel),
                        )
                    })
                };

                let error = match author {
                    None => return,
                    Some((_, false, _)) => Some("Only admins can publish updates"),
                    Some((_, true, false)) => Some("Subscribe to the channel before publishing"),
                    Some((author_id, true, true)) => {
                        let update = AdminUpdate {
                            channel,
                            entity,
                            entity_id,
                            action,
                            payload,
                            author_id: Some(author_id),
                            timestamp: chrono::Utc::now(),
                        };
                        self.publish_admin_update(update, Some(conn_id)).await;
                        None
                    }
                };

                if let Some(message) = error {
                    self.send_to(conn_id, ServerMessage::error(message)).await;
                }
            }
        }
    }
}
