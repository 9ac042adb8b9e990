//! Client engine for Twitch chat (TMI, the Twitch Messaging Interface).
//!
//! The crate maintains an authenticated chat session: it negotiates IRCv3
//! capabilities, authenticates, decodes the full family of TMI frames
//! (messages, whispers, notices, hosting, room modes, moderation events,
//! subscription/raid/ritual announcements), and exposes outbound commands
//! plus an event sink to the embedding application.
//!
//! All session work happens on one worker thread behind a FIFO mailbox:
//! API calls and transport callbacks enqueue, the worker performs. Event
//! callbacks are therefore serialized and ordered like the wire traffic
//! that produced them.
//!
//! The transport and the clock are injected capabilities
//! ([`Connection`], [`TimeKeeper`]); a tokio-based TCP/TLS transport is
//! provided in [`transport`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use tmi_sdk::{EventHandler, MessageInfo, SystemClock, TmiClient, TWITCH_CHAT_SERVER};
//!
//! struct Printer;
//!
//! impl EventHandler for Printer {
//!     fn message(&mut self, info: MessageInfo) {
//!         println!("#{} <{}> {}", info.channel, info.user, info.text);
//!     }
//! }
//!
//! let client = TmiClient::new();
//! let factory = tmi_sdk::twitch_connection_factory(TWITCH_CHAT_SERVER).unwrap();
//! client.set_connection_factory(factory);
//! client.set_time_keeper(Arc::new(SystemClock::new()));
//! client.set_handler(Printer);
//! client.log_in_anonymously();
//! client.join("somechannel");
//! std::thread::sleep(std::time::Duration::from_secs(30));
//! ```

pub mod connection;
pub mod event;
pub mod irc;
pub mod tags;
pub mod transport;

mod client;
mod session;

pub use client::TmiClient;
pub use connection::{
    Connection, ConnectionFactory, DisconnectedHandler, MessageReceivedHandler, TimeKeeper,
};
pub use event::{
    ClearInfo, ClearKind, EventHandler, HostInfo, MembershipInfo, MessageInfo, ModInfo,
    NoticeInfo, RaidInfo, RitualInfo, RoomModeChangeInfo, SubInfo, SubKind, UserStateInfo,
    WhisperInfo,
};
pub use irc::Message;
pub use tags::{escape_tag_value, unescape_tag_value, TagsInfo, DEFAULT_NAME_COLOR};
pub use transport::{twitch_connection_factory, NetConnection, SystemClock, TWITCH_CHAT_SERVER};
