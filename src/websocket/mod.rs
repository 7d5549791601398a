//! Real-time channel hub for admin change notifications.
//!
//! Clients connect with a session token, subscribe to channels and receive
//! `admin_update`, presence and per-user notifications. Membership is held
//! in process and is not shared between instances.

pub mod hub;
pub mod messages;
pub mod server;

pub use hub::{ChannelMember, ConnectionId, ConnectionInfo, WsHub};
pub use messages::{AdminUpdate, Channel, ClientMessage, PresenceStatus, ServerMessage};
pub use server::WebSocketServer;
