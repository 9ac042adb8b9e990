//! Session state machine.
//!
//! Owns everything mutable about a chat session: the connection handle,
//! the receive buffer, the login sub-state machine, and the list of
//! actions awaiting a server reply. A [`Session`] is owned by the worker
//! thread and only ever touched from its call stack; the mailbox sender it
//! holds is how transport callbacks feed bytes back in.

use std::collections::BTreeSet;
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::connection::{Connection, ConnectionFactory, TimeKeeper};
use crate::event::{
    ClearInfo, ClearKind, EventHandler, HostInfo, MembershipInfo, MessageInfo, ModInfo,
    NoticeInfo, RaidInfo, RitualInfo, RoomModeChangeInfo, SubInfo, SubKind, UserStateInfo,
    WhisperInfo,
};
use crate::irc::{Message, CRLF};
use crate::tags::{unescape_tag_value, TagsInfo};

/// How long to wait for each server reply during login before giving up.
const LOGIN_TIMEOUT_SECONDS: f64 = 5.0;

/// Capabilities requested when the server advertises all of them.
const REQUIRED_CAPS: [&str; 3] = [
    "twitch.tv/commands",
    "twitch.tv/membership",
    "twitch.tv/tags",
];

/// Room mode tags recognized on ROOMSTATE frames, in delivery order.
const ROOM_MODES: [&str; 5] = ["slow", "followers-only", "r9k", "emote-only", "subs-only"];

/// The ACTION envelope marking `/me` messages.
const ACTION_PREFIX: &str = "\u{1}ACTION";

/// One unit of work for the session, queued through the mailbox.
pub(crate) enum Action {
    SetConnectionFactory(ConnectionFactory),
    SetTimeKeeper(Arc<dyn TimeKeeper>),
    SetHandler(Box<dyn EventHandler>),
    LogIn {
        nickname: String,
        token: String,
        anonymous: bool,
    },
    LogOut {
        farewell: String,
    },
    ProcessBytes(Vec<u8>),
    ServerDisconnected,
    Join {
        channel: String,
    },
    Leave {
        channel: String,
    },
    SendMessage {
        channel: String,
        text: String,
    },
    SendWhisper {
        nickname: String,
        text: String,
    },
    /// Ends the worker loop; handled there, never by the session.
    Shutdown,
}

/// Which server reply a queued login step is waiting for.
enum Wait {
    /// The `CAP * LS` capability listing.
    CapList,
    /// The `CAP * ACK`/`NAK` answer to our capability request.
    CapAck,
    /// The end-of-MOTD numeric (376) confirming login.
    Motd,
}

/// A login step parked on the awaiting-responses list.
struct Awaiter {
    wait: Wait,
    nickname: String,
    token: String,
    /// Time (per the session's time keeper) at which the step expires.
    expiration: f64,
}

/// Discards every event.
struct NullHandler;

impl EventHandler for NullHandler {}

pub(crate) struct Session {
    /// Used to wire transport callbacks back into the worker.
    mailbox: Sender<Action>,
    connection_factory: Option<ConnectionFactory>,
    time_keeper: Option<Arc<dyn TimeKeeper>>,
    handler: Box<dyn EventHandler>,
    connection: Option<Box<dyn Connection>>,
    /// Raw bytes received but not yet forming a complete line.
    data_received: Vec<u8>,
    logged_in: bool,
    anonymous: bool,
    awaiting: Vec<Awaiter>,
    caps_supported: BTreeSet<String>,
}

impl Session {
    pub(crate) fn new(mailbox: Sender<Action>) -> Self {
        Self {
            mailbox,
            connection_factory: None,
            time_keeper: None,
            handler: Box::new(NullHandler),
            connection: None,
            data_received: Vec::new(),
            logged_in: false,
            anonymous: false,
            awaiting: Vec::new(),
            caps_supported: BTreeSet::new(),
        }
    }

    /// Whether any login step is still waiting on the server. The worker
    /// uses this to decide between a capped and an uncapped mailbox wait.
    pub(crate) fn awaiting_replies(&self) -> bool {
        !self.awaiting.is_empty()
    }

    pub(crate) fn perform(&mut self, action: Action) {
        match action {
            Action::SetConnectionFactory(factory) => self.connection_factory = Some(factory),
            Action::SetTimeKeeper(time_keeper) => self.time_keeper = Some(time_keeper),
            Action::SetHandler(handler) => self.handler = handler,
            Action::LogIn {
                nickname,
                token,
                anonymous,
            } => self.log_in(nickname, token, anonymous),
            Action::LogOut { farewell } => self.disconnect(&farewell),
            Action::ProcessBytes(bytes) => self.process_bytes(&bytes),
            Action::ServerDisconnected => self.disconnect(""),
            Action::Join { channel } => self.join(&channel),
            Action::Leave { channel } => self.leave(&channel),
            Action::SendMessage { channel, text } => self.send_message(&channel, &text),
            Action::SendWhisper { nickname, text } => self.send_whisper(&nickname, &text),
            Action::Shutdown => {}
        }
    }

    /// Expire and dispatch every awaiting step whose deadline has passed.
    /// Runs on every worker wake-up, but only once a time keeper is set.
    pub(crate) fn sweep_timeouts(&mut self) {
        let Some(time_keeper) = self.time_keeper.clone() else {
            return;
        };
        if self.awaiting.is_empty() {
            return;
        }
        let now = time_keeper.now();
        let (expired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.awaiting)
            .into_iter()
            .partition(|awaiter| now >= awaiter.expiration);
        self.awaiting = pending;
        for awaiter in expired {
            match awaiter.wait {
                Wait::CapList => self.disconnect("Timeout waiting for capability list"),
                Wait::CapAck => {
                    self.disconnect("Timeout waiting for response to capability request");
                }
                Wait::Motd => self.disconnect("Timeout waiting for MOTD"),
            }
        }
    }

    // ---- action performers ----

    fn log_in(&mut self, nickname: String, token: String, anonymous: bool) {
        if self.connection.is_some() {
            return;
        }
        let Some(factory) = self.connection_factory.as_mut() else {
            tracing::error!("cannot log in: no connection factory configured");
            self.handler.logged_out();
            return;
        };
        let mut connection = factory();
        let mailbox = self.mailbox.clone();
        connection.set_message_received(Arc::new(move |bytes: &[u8]| {
            let _ = mailbox.send(Action::ProcessBytes(bytes.to_vec()));
        }));
        let mailbox = self.mailbox.clone();
        connection.set_disconnected(Arc::new(move || {
            let _ = mailbox.send(Action::ServerDisconnected);
        }));
        if !connection.connect() {
            self.handler.logged_out();
            return;
        }
        self.caps_supported.clear();
        self.anonymous = anonymous;
        self.connection = Some(connection);
        self.send_line("CAP LS 302");
        let expiration = self.reply_deadline();
        self.awaiting.push(Awaiter {
            wait: Wait::CapList,
            nickname,
            token,
            expiration,
        });
    }

    fn join(&mut self, channel: &str) {
        if self.connection.is_none() {
            return;
        }
        self.send_line(&format!("JOIN #{channel}"));
    }

    fn leave(&mut self, channel: &str) {
        if self.connection.is_none() {
            return;
        }
        self.send_line(&format!("PART #{channel}"));
    }

    fn send_message(&mut self, channel: &str, text: &str) {
        if self.connection.is_none() || self.anonymous {
            return;
        }
        self.send_line(&format!("PRIVMSG #{channel} :{text}"));
    }

    fn send_whisper(&mut self, nickname: &str, text: &str) {
        if self.connection.is_none() || self.anonymous {
            return;
        }
        self.send_line(&format!("PRIVMSG #jtv :.w {nickname} {text}"));
    }

    fn process_bytes(&mut self, bytes: &[u8]) {
        self.data_received.extend_from_slice(bytes);
        while let Some(message) = Message::parse(&mut self.data_received) {
            if message.command.is_empty() {
                tracing::debug!("discarding malformed frame");
                continue;
            }
            self.dispatch(message);
        }
    }

    /// Tear the session down: optional QUIT, close the transport, reset
    /// login state, and tell the embedder. A second call is a no-op.
    fn disconnect(&mut self, farewell: &str) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        if !farewell.is_empty() {
            tracing::trace!("< QUIT :{farewell}");
            connection.send(&format!("QUIT :{farewell}{CRLF}"));
        }
        connection.disconnect();
        self.logged_in = false;
        self.awaiting.clear();
        self.handler.logged_out();
    }

    // ---- server command handlers ----

    fn dispatch(&mut self, mut message: Message) {
        let command = std::mem::take(&mut message.command);
        match command.as_str() {
            "376" => self.handle_motd(),
            "PING" => self.handle_ping(&message),
            "JOIN" => self.handle_join(&message),
            "PART" => self.handle_part(&message),
            "PRIVMSG" => self.handle_privmsg(message),
            "CAP" => self.handle_cap(&message),
            "WHISPER" => self.handle_whisper(message),
            "NOTICE" => self.handle_notice(message),
            "HOSTTARGET" => self.handle_host_target(&message),
            "ROOMSTATE" => self.handle_room_state(&message),
            "CLEARCHAT" => self.handle_clear_chat(message),
            "CLEARMSG" => self.handle_clear_message(message),
            "MODE" => self.handle_mode(&message),
            "GLOBALUSERSTATE" => self.handle_global_user_state(message),
            "USERSTATE" => self.handle_user_state(message),
            "USERNOTICE" => self.handle_user_notice(message),
            "RECONNECT" => self.handler.doom(),
            other => tracing::debug!(command = other, "unhandled server command"),
        }
    }

    /// End of MOTD: completes the pending login, exactly once.
    fn handle_motd(&mut self) {
        let pending = std::mem::take(&mut self.awaiting);
        let mut kept = Vec::with_capacity(pending.len());
        for awaiter in pending {
            if matches!(awaiter.wait, Wait::Motd) {
                if !self.logged_in {
                    self.logged_in = true;
                    self.handler.logged_in();
                }
            } else {
                kept.push(awaiter);
            }
        }
        kept.append(&mut self.awaiting);
        self.awaiting = kept;
    }

    fn handle_ping(&mut self, message: &Message) {
        let Some(token) = message.parameters.first() else {
            return;
        };
        let reply = format!("PONG :{token}");
        self.send_line(&reply);
    }

    fn handle_cap(&mut self, message: &Message) {
        // Offer the frame to each waiting login step in queue order; a
        // step that consumes it leaves the list (having queued its
        // successor).
        let pending = std::mem::take(&mut self.awaiting);
        let mut kept = Vec::with_capacity(pending.len());
        for awaiter in pending {
            let still_waiting = match awaiter.wait {
                Wait::CapList => self.offer_cap_list(awaiter, message),
                Wait::CapAck => self.offer_cap_ack(awaiter, message),
                Wait::Motd => Some(awaiter),
            };
            if let Some(awaiter) = still_waiting {
                kept.push(awaiter);
            }
        }
        kept.append(&mut self.awaiting);
        self.awaiting = kept;
    }

    fn handle_join(&mut self, message: &Message) {
        let Some(info) = self.membership_info(message) else {
            return;
        };
        self.handler.join(info);
    }

    fn handle_part(&mut self, message: &Message) {
        let Some(info) = self.membership_info(message) else {
            return;
        };
        self.handler.leave(info);
    }

    fn handle_privmsg(&mut self, message: Message) {
        if message.parameters.len() < 2 {
            return;
        }
        let user = nickname_from_prefix(&message.prefix)
            .unwrap_or_default()
            .to_string();
        let Message {
            tags, parameters, ..
        } = message;
        let target = &parameters[0];
        if !target.starts_with('#') {
            // Addressed to us by nickname: a direct message from a server
            // user such as jtv announcing that someone is hosting us.
            if target.is_empty() {
                return;
            }
            self.handler.private_message(MessageInfo {
                text: parameters[1].clone(),
                message_id: tag_text(&tags, "id"),
                bits: tag_number(&tags, "bits"),
                tags,
                channel: String::new(),
                user,
                is_action: false,
            });
            return;
        }
        let Some(channel) = channel_name(target) else {
            return;
        };
        let channel = channel.to_string();
        let (text, is_action) = split_action(&parameters[1]);
        self.handler.message(MessageInfo {
            message_id: tag_text(&tags, "id"),
            bits: tag_number(&tags, "bits"),
            tags,
            channel,
            user,
            text,
            is_action,
        });
    }

    fn handle_whisper(&mut self, message: Message) {
        if message.parameters.len() < 2 || message.parameters[0].is_empty() {
            return;
        }
        let user = nickname_from_prefix(&message.prefix)
            .unwrap_or_default()
            .to_string();
        self.handler.whisper(WhisperInfo {
            text: message.parameters[1].clone(),
            tags: message.tags,
            user,
        });
    }

    fn handle_notice(&mut self, message: Message) {
        if message.parameters.len() < 2 || message.parameters[0].is_empty() {
            return;
        }
        let target = &message.parameters[0];
        let channel = if target == "*" {
            String::new()
        } else {
            target.strip_prefix('#').unwrap_or(target).to_string()
        };
        let text = message.parameters[1].clone();
        self.handler.notice(NoticeInfo {
            id: tag_text(&message.tags, "msg-id"),
            text: text.clone(),
            channel,
        });
        // The server reports a bad token as a plain notice; either wording
        // ends the pending login. The MOTD awaiter is dropped silently so
        // its timeout cannot fire a second disconnect later.
        if !self.logged_in
            && (text == "Login authentication failed" || text == "Login unsuccessful")
        {
            self.handler.logged_out();
            self.awaiting
                .retain(|awaiter| !matches!(awaiter.wait, Wait::Motd));
        }
    }

    fn handle_host_target(&mut self, message: &Message) {
        if message.parameters.len() < 2 {
            return;
        }
        let Some(hosting) = channel_name(&message.parameters[0]) else {
            return;
        };
        let hosting = hosting.to_string();
        let mut parts = message.parameters[1].split(' ');
        let target = parts.next().unwrap_or("");
        let viewers = parts.next().and_then(|count| count.parse().ok()).unwrap_or(0);
        let info = if target == "-" {
            HostInfo {
                on: false,
                hosting,
                being_hosted: String::new(),
                viewers,
            }
        } else {
            HostInfo {
                on: true,
                hosting,
                being_hosted: target.to_string(),
                viewers,
            }
        };
        self.handler.host(info);
    }

    fn handle_room_state(&mut self, message: &Message) {
        let Some(channel) = message
            .parameters
            .first()
            .and_then(|target| channel_name(target))
        else {
            return;
        };
        for mode in ROOM_MODES {
            let Some(value) = message.tags.all_tags.get(mode) else {
                continue;
            };
            self.handler.room_mode_change(RoomModeChangeInfo {
                mode: mode.to_string(),
                parameter: value.parse().unwrap_or(0),
                channel: channel.to_string(),
                channel_id: message.tags.channel_id,
            });
        }
    }

    fn handle_clear_chat(&mut self, message: Message) {
        let Some(channel) = message
            .parameters
            .first()
            .and_then(|target| channel_name(target))
        else {
            return;
        };
        let channel = channel.to_string();
        let Message {
            mut tags,
            parameters,
            ..
        } = message;
        // CLEARCHAT identifies the affected user via target-user-id rather
        // than the usual user-id.
        if let Some(value) = tags.all_tags.get("target-user-id") {
            tags.user_id = value.parse().unwrap_or(0);
        }
        let mut info = ClearInfo {
            channel,
            ..ClearInfo::default()
        };
        if let Some(user) = parameters.get(1) {
            info.user = user.clone();
            info.reason = tag_unescaped(&tags, "ban-reason");
            match tags.all_tags.get("ban-duration") {
                Some(duration) => {
                    info.kind = ClearKind::Timeout;
                    info.duration = duration.parse().unwrap_or(0);
                }
                None => info.kind = ClearKind::Ban,
            }
        }
        info.tags = tags;
        self.handler.clear(info);
    }

    fn handle_clear_message(&mut self, message: Message) {
        if message.parameters.len() < 2 {
            return;
        }
        let Some(channel) = channel_name(&message.parameters[0]) else {
            return;
        };
        let channel = channel.to_string();
        let Message {
            tags, parameters, ..
        } = message;
        self.handler.clear(ClearInfo {
            kind: ClearKind::ClearMessage,
            channel,
            user: tag_text(&tags, "login"),
            offending_message_id: tag_text(&tags, "target-msg-id"),
            offending_message_text: parameters[1].clone(),
            tags,
            ..ClearInfo::default()
        });
    }

    fn handle_mode(&mut self, message: &Message) {
        if message.parameters.len() < 3 {
            return;
        }
        let Some(channel) = channel_name(&message.parameters[0]) else {
            return;
        };
        let moderator = match message.parameters[1].as_str() {
            "+o" => true,
            "-o" => false,
            _ => return,
        };
        self.handler.mod_status(ModInfo {
            moderator,
            channel: channel.to_string(),
            user: message.parameters[2].clone(),
        });
    }

    fn handle_global_user_state(&mut self, message: Message) {
        self.handler.user_state(UserStateInfo {
            global: true,
            channel: String::new(),
            tags: message.tags,
        });
    }

    fn handle_user_state(&mut self, message: Message) {
        let Some(channel) = message
            .parameters
            .first()
            .and_then(|target| channel_name(target))
        else {
            return;
        };
        self.handler.user_state(UserStateInfo {
            global: false,
            channel: channel.to_string(),
            tags: message.tags,
        });
    }

    /// USERNOTICE fans out by the `msg-id` tag: subscriptions, raids, and
    /// rituals all share this frame.
    fn handle_user_notice(&mut self, message: Message) {
        let Some(channel) = message
            .parameters
            .first()
            .and_then(|target| channel_name(target))
        else {
            return;
        };
        let channel = channel.to_string();
        let Message {
            tags, parameters, ..
        } = message;
        let user = tag_text(&tags, "login");
        let user_message = parameters.get(1).cloned().unwrap_or_default();
        let system_message = tag_unescaped(&tags, "system-msg");
        match tag_text(&tags, "msg-id").as_str() {
            "raid" => self.handler.raid(RaidInfo {
                channel,
                raider: tag_text(&tags, "msg-param-login"),
                viewers: tag_number(&tags, "msg-param-viewerCount"),
                system_message,
                tags,
            }),
            "ritual" => self.handler.ritual(RitualInfo {
                channel,
                user,
                ritual: tag_text(&tags, "msg-param-ritual-name"),
                system_message,
                tags,
            }),
            kind => {
                let kind = match kind {
                    "sub" => SubKind::Sub,
                    "resub" => SubKind::Resub,
                    "subgift" => SubKind::Gifted,
                    "submysterygift" => SubKind::MysteryGift,
                    _ => SubKind::Unknown,
                };
                self.handler.sub(SubInfo {
                    kind,
                    channel,
                    user,
                    recipient_display_name: tag_text(&tags, "msg-param-recipient-display-name"),
                    recipient_user_name: tag_text(&tags, "msg-param-recipient-user-name"),
                    recipient_id: tag_number(&tags, "msg-param-recipient-id"),
                    mass_gift_count: tag_number(&tags, "msg-param-mass-gift-count"),
                    sender_count: tag_number(&tags, "msg-param-sender-count"),
                    user_message,
                    system_message,
                    plan_name: tag_unescaped(&tags, "msg-param-sub-plan-name"),
                    months: tag_number(&tags, "msg-param-months"),
                    plan_id: tag_number(&tags, "msg-param-sub-plan"),
                    tags,
                });
            }
        }
    }

    // ---- login steps ----

    /// `CAP * LS`: collect advertised capabilities. A `*` in place of the
    /// capability list marks a multi-line listing with more to come.
    fn offer_cap_list(&mut self, awaiter: Awaiter, message: &Message) -> Option<Awaiter> {
        if message.parameters.len() < 3 || message.parameters[1] != "LS" {
            return Some(awaiter);
        }
        if message.parameters[2] == "*" {
            if let Some(caps) = message.parameters.get(3) {
                self.caps_supported
                    .extend(caps.split(' ').map(str::to_string));
            }
            return Some(awaiter);
        }
        self.caps_supported
            .extend(message.parameters[2].split(' ').map(str::to_string));
        if REQUIRED_CAPS
            .iter()
            .all(|cap| self.caps_supported.contains(*cap))
        {
            self.request_capabilities(awaiter);
        } else {
            // The server lacks some of what we want; proceed without the
            // request and live with the reduced feature set.
            self.authenticate(awaiter);
        }
        None
    }

    /// `CAP * ACK`/`NAK`: either answer ends negotiation.
    fn offer_cap_ack(&mut self, awaiter: Awaiter, message: &Message) -> Option<Awaiter> {
        let verdict = message.parameters.get(1).map(String::as_str);
        if !matches!(verdict, Some("ACK") | Some("NAK")) {
            return Some(awaiter);
        }
        self.authenticate(awaiter);
        None
    }

    fn request_capabilities(&mut self, mut awaiter: Awaiter) {
        self.send_line(&format!("CAP REQ :{}", REQUIRED_CAPS.join(" ")));
        awaiter.wait = Wait::CapAck;
        awaiter.expiration = self.reply_deadline();
        self.awaiting.push(awaiter);
    }

    /// Close capability negotiation and authenticate. NICK must never be
    /// sent before CAP END.
    fn authenticate(&mut self, mut awaiter: Awaiter) {
        self.send_line("CAP END");
        if !self.anonymous {
            let pass = format!("PASS oauth:{}", awaiter.token);
            self.send_line(&pass);
        }
        self.send_line(&format!("NICK {}", awaiter.nickname));
        awaiter.wait = Wait::Motd;
        awaiter.expiration = self.reply_deadline();
        self.awaiting.push(awaiter);
    }

    // ---- plumbing ----

    fn membership_info(&self, message: &Message) -> Option<MembershipInfo> {
        let channel = channel_name(message.parameters.first()?)?;
        let user = nickname_from_prefix(&message.prefix)?;
        // Our own anonymous nickname joining or leaving would read to the
        // embedder like a random justinfan user; suppress it.
        if self.anonymous && is_anonymous_nickname(user) {
            return None;
        }
        Some(MembershipInfo {
            channel: channel.to_string(),
            user: user.to_string(),
        })
    }

    fn reply_deadline(&self) -> f64 {
        self.time_keeper
            .as_ref()
            .map_or(0.0, |time_keeper| time_keeper.now() + LOGIN_TIMEOUT_SECONDS)
    }

    /// Send one line, appending CRLF, and leave a diagnostic trace with
    /// credentials blanked out.
    fn send_line(&mut self, line: &str) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        tracing::trace!("< {}", redact_credentials(line));
        connection.send(&format!("{line}{CRLF}"));
    }
}

/// The nickname portion of a `nick!user@host` prefix.
fn nickname_from_prefix(prefix: &str) -> Option<&str> {
    prefix.split_once('!').map(|(nickname, _)| nickname)
}

/// A channel parameter without its leading `#`, or `None` when the
/// parameter is not a well-formed channel name.
fn channel_name(parameter: &str) -> Option<&str> {
    parameter
        .strip_prefix('#')
        .filter(|name| !name.is_empty())
}

/// Whether a nickname looks like a synthesized anonymous one.
fn is_anonymous_nickname(nickname: &str) -> bool {
    match nickname.strip_prefix("justinfan") {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Unwrap the `\x01ACTION …\x01` envelope of `/me` messages.
fn split_action(text: &str) -> (String, bool) {
    match text
        .strip_prefix(ACTION_PREFIX)
        .and_then(|rest| rest.strip_suffix('\u{1}'))
    {
        Some(body) => (body.to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Outbound lines are traced verbatim, except the OAuth token.
fn redact_credentials(line: &str) -> &str {
    if line.starts_with("PASS oauth:") {
        "PASS oauth:**********************"
    } else {
        line
    }
}

fn tag_text(tags: &TagsInfo, name: &str) -> String {
    tags.all_tags.get(name).cloned().unwrap_or_default()
}

fn tag_unescaped(tags: &TagsInfo, name: &str) -> String {
    tags.all_tags
        .get(name)
        .map(|value| unescape_tag_value(value))
        .unwrap_or_default()
}

fn tag_number(tags: &TagsInfo, name: &str) -> u64 {
    tags.all_tags
        .get(name)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}
