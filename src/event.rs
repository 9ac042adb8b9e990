//! Events delivered to the embedding application.
//!
//! The engine hands every inbound happening to an [`EventHandler`]
//! implementation as an owned record. All methods default to no-ops so an
//! embedder only implements the events it cares about. Callbacks are
//! invoked from the engine's worker thread, one at a time, in the order
//! the originating frames arrived.

use crate::tags::TagsInfo;

/// A user entering or leaving a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipInfo {
    /// Channel whose membership changed, without the leading `#`.
    pub channel: String,
    /// Nickname of the user who joined or left.
    pub user: String,
}

/// A chat message, either in a channel or sent directly by a server user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageInfo {
    pub tags: TagsInfo,
    /// Channel the message was sent to; empty for direct server messages.
    pub channel: String,
    /// Nickname of the sender.
    pub user: String,
    /// Message text. For action messages the envelope is already stripped.
    pub text: String,
    /// Server-assigned message id (`id` tag), if any.
    pub message_id: String,
    /// Bits cheered with the message; zero when none.
    pub bits: u64,
    /// Whether the message was sent as a `/me` action.
    pub is_action: bool,
}

/// A whisper (private message between users).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhisperInfo {
    pub tags: TagsInfo,
    /// Nickname of the sender.
    pub user: String,
    /// Whisper text.
    pub text: String,
}

/// A server notice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoticeInfo {
    /// Notice id (`msg-id` tag); may be empty.
    pub id: String,
    /// Notice text.
    pub text: String,
    /// Channel context, or empty for a global notice.
    pub channel: String,
}

/// A channel starting or stopping hosting another channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostInfo {
    /// Whether host mode is now on.
    pub on: bool,
    /// Channel doing the hosting.
    pub hosting: String,
    /// Channel being hosted; empty when host mode turned off.
    pub being_hosted: String,
    /// Viewers brought along to the hosted channel.
    pub viewers: u64,
}

/// A single room mode changing.
///
/// The meaning of `parameter` depends on the mode:
/// - `slow`: seconds between messages, `0` when off
/// - `followers-only`: minimum minutes followed, `-1` when off, `0` for
///   all followers
/// - `r9k`, `emote-only`, `subs-only`: `1` on, `0` off
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomModeChangeInfo {
    /// Which mode changed (`slow`, `followers-only`, `r9k`, `emote-only`,
    /// `subs-only`).
    pub mode: String,
    /// Per-mode parameter, see above.
    pub parameter: i32,
    /// Channel whose mode changed.
    pub channel: String,
    /// Id of the channel whose mode changed.
    pub channel_id: u64,
}

/// What kind of chat clearing happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClearKind {
    /// All messages removed from the channel.
    #[default]
    ClearAll,
    /// A single message deleted.
    ClearMessage,
    /// A user temporarily prevented from chatting.
    Timeout,
    /// A user permanently banned from the channel.
    Ban,
}

/// Chat being cleared, a message being deleted, or a user being timed out
/// or banned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearInfo {
    pub kind: ClearKind,
    /// Channel the clearing happened in.
    pub channel: String,
    /// Affected user, for [`ClearKind::Timeout`], [`ClearKind::Ban`], and
    /// [`ClearKind::ClearMessage`].
    pub user: String,
    /// Human-readable reason, unescaped; timeouts and bans only.
    pub reason: String,
    /// Id of the deleted message ([`ClearKind::ClearMessage`] only).
    pub offending_message_id: String,
    /// Text of the deleted message ([`ClearKind::ClearMessage`] only).
    pub offending_message_text: String,
    /// Timeout length in seconds ([`ClearKind::Timeout`] only).
    pub duration: u64,
    pub tags: TagsInfo,
}

/// A user gaining or losing moderator status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModInfo {
    /// Whether the user is now a moderator.
    pub moderator: bool,
    pub channel: String,
    pub user: String,
}

/// Our own state, globally or within one channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserStateInfo {
    /// True for the global state notification, false for per-channel.
    pub global: bool,
    /// Channel the state applies to; empty when global.
    pub channel: String,
    pub tags: TagsInfo,
}

/// What kind of subscription notification was announced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubKind {
    /// Unrecognized notification; consult the `msg-id` tag.
    #[default]
    Unknown,
    /// First-time subscription (or after a lapse).
    Sub,
    /// Renewed subscription.
    Resub,
    /// Subscription gifted to a specific user.
    Gifted,
    /// Subscriptions gifted to the channel's community.
    MysteryGift,
}

/// A subscription announcement in a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubInfo {
    pub kind: SubKind,
    /// Channel the subscription is for.
    pub channel: String,
    /// User who subscribed (or gifted).
    pub user: String,
    /// Display name of the gift recipient ([`SubKind::Gifted`] only).
    pub recipient_display_name: String,
    /// User name of the gift recipient ([`SubKind::Gifted`] only).
    pub recipient_user_name: String,
    /// Id of the gift recipient ([`SubKind::Gifted`] only).
    pub recipient_id: u64,
    /// Number of community subs being gifted ([`SubKind::MysteryGift`]).
    pub mass_gift_count: u64,
    /// Gifter's running gift total in this channel.
    pub sender_count: u64,
    /// Message the subscriber attached, if any.
    pub user_message: String,
    /// Server-provided announcement text, unescaped.
    pub system_message: String,
    /// Name of the subscription plan, unescaped.
    pub plan_name: String,
    /// Consecutive months subscribed (resubs).
    pub months: u64,
    /// Numeric id of the subscription plan.
    pub plan_id: u64,
    pub tags: TagsInfo,
}

/// An incoming raid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaidInfo {
    /// Channel being raided.
    pub channel: String,
    /// User/channel doing the raiding.
    pub raider: String,
    /// Number of arriving viewers.
    pub viewers: u64,
    /// Server-provided announcement text, unescaped.
    pub system_message: String,
    pub tags: TagsInfo,
}

/// A channel ritual (for example a new chatter's first message).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RitualInfo {
    pub channel: String,
    pub user: String,
    /// Ritual name (`msg-param-ritual-name`), e.g. `new_chatter`.
    pub ritual: String,
    /// Server-provided announcement text, unescaped.
    pub system_message: String,
    pub tags: TagsInfo,
}

/// Receives every event the engine produces.
///
/// All methods have empty default bodies. Implementations are moved into
/// the engine and called only from its worker thread, so `&mut self`
/// access needs no further synchronization.
pub trait EventHandler: Send {
    /// The server announced it is about to go down; expect a disconnect.
    fn doom(&mut self) {}

    /// Login completed (end of MOTD received). At most once per login.
    fn logged_in(&mut self) {}

    /// The session ended: logout, server disconnect, or a failed
    /// connection or login attempt.
    fn logged_out(&mut self) {}

    /// A user joined a channel we are in.
    fn join(&mut self, _info: MembershipInfo) {}

    /// A user left a channel we are in.
    fn leave(&mut self, _info: MembershipInfo) {}

    /// A chat message arrived in a channel.
    fn message(&mut self, _info: MessageInfo) {}

    /// A server user (typically `jtv`) messaged us directly.
    fn private_message(&mut self, _info: MessageInfo) {}

    /// A whisper arrived.
    fn whisper(&mut self, _info: WhisperInfo) {}

    /// A server notice arrived.
    fn notice(&mut self, _info: NoticeInfo) {}

    /// A hosting change was announced.
    fn host(&mut self, _info: HostInfo) {}

    /// A room mode changed; one call per changed mode.
    fn room_mode_change(&mut self, _info: RoomModeChangeInfo) {}

    /// Chat was cleared, a message deleted, or a user timed out/banned.
    fn clear(&mut self, _info: ClearInfo) {}

    /// A user's moderator status was announced.
    fn mod_status(&mut self, _info: ModInfo) {}

    /// Our own user state arrived.
    fn user_state(&mut self, _info: UserStateInfo) {}

    /// A subscription was announced.
    fn sub(&mut self, _info: SubInfo) {}

    /// A raid was announced.
    fn raid(&mut self, _info: RaidInfo) {}

    /// A ritual was announced.
    fn ritual(&mut self, _info: RitualInfo) {}
}
