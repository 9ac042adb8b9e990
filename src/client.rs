//! Public client API and the worker thread that owns the session.
//!
//! Every public method only enqueues an [`Action`] on the mailbox and
//! returns; the worker drains the mailbox in FIFO order and is the single
//! place where session state changes and event callbacks happen. Transport
//! callbacks feed the same mailbox, so inbound bytes and client commands
//! are serialized against each other for free.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use rand::Rng;

use crate::connection::{Connection, TimeKeeper};
use crate::event::EventHandler;
use crate::session::{Action, Session};

/// Upper bound on one mailbox wait while server replies are pending, so
/// the worker re-checks deadlines often enough.
const SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// A user agent for Twitch chat.
///
/// Configure it with a connection factory, a time keeper, and an event
/// handler, then drive it with the command methods. Nothing blocks; all
/// outcomes arrive through the handler. Dropping the client stops the
/// worker and joins it; no callbacks fire afterwards.
pub struct TmiClient {
    mailbox: Sender<Action>,
    worker: Option<JoinHandle<()>>,
}

impl TmiClient {
    pub fn new() -> Self {
        let (mailbox, actions) = crossbeam_channel::unbounded();
        let session = Session::new(mailbox.clone());
        let worker = thread::Builder::new()
            .name("tmi-worker".to_string())
            .spawn(move || worker_loop(&actions, session))
            .expect("failed to spawn worker thread");
        Self {
            mailbox,
            worker: Some(worker),
        }
    }

    /// Provide the means of opening connections to the chat server.
    /// The factory is invoked once per login attempt.
    pub fn set_connection_factory(
        &self,
        factory: impl FnMut() -> Box<dyn Connection> + Send + 'static,
    ) {
        self.post(Action::SetConnectionFactory(Box::new(factory)));
    }

    /// Provide the clock used to expire unanswered login steps.
    pub fn set_time_keeper(&self, time_keeper: Arc<dyn TimeKeeper>) {
        self.post(Action::SetTimeKeeper(time_keeper));
    }

    /// Provide the sink that receives all session events.
    pub fn set_handler(&self, handler: impl EventHandler + 'static) {
        self.post(Action::SetHandler(Box::new(handler)));
    }

    /// Start logging in as a registered user or bot.
    ///
    /// `nickname` is the account name, all lower-case; `token` is the
    /// OAuth token (without the `oauth:` prefix).
    pub fn log_in(&self, nickname: &str, token: &str) {
        self.post(Action::LogIn {
            nickname: nickname.to_string(),
            token: token.to_string(),
            anonymous: false,
        });
    }

    /// Start logging in anonymously, under a synthesized `justinfan`
    /// nickname. Anonymous sessions can read chat but all sends are
    /// silently discarded.
    pub fn log_in_anonymously(&self) {
        let nickname = format!("justinfan{}", rand::rng().random_range(0u32..100_000_000));
        self.post(Action::LogIn {
            nickname,
            token: String::new(),
            anonymous: true,
        });
    }

    /// Log out, sending `QUIT :<farewell>` first if `farewell` is
    /// non-empty.
    pub fn log_out(&self, farewell: &str) {
        self.post(Action::LogOut {
            farewell: farewell.to_string(),
        });
    }

    /// Join a chat channel. Pass the channel name without the leading `#`.
    pub fn join(&self, channel: &str) {
        self.post(Action::Join {
            channel: channel.to_string(),
        });
    }

    /// Leave a chat channel. Pass the channel name without the leading `#`.
    pub fn leave(&self, channel: &str) {
        self.post(Action::Leave {
            channel: channel.to_string(),
        });
    }

    /// Send a chat message to a channel.
    pub fn send_message(&self, channel: &str, text: &str) {
        self.post(Action::SendMessage {
            channel: channel.to_string(),
            text: text.to_string(),
        });
    }

    /// Send a whisper to another user.
    pub fn send_whisper(&self, nickname: &str, text: &str) {
        self.post(Action::SendWhisper {
            nickname: nickname.to_string(),
            text: text.to_string(),
        });
    }

    fn post(&self, action: Action) {
        let _ = self.mailbox.send(action);
    }
}

impl Default for TmiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TmiClient {
    fn drop(&mut self) {
        let _ = self.mailbox.send(Action::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// The worker: sweep expired login steps, drain the mailbox, then wait.
/// The wait is capped while replies are pending so deadlines are observed
/// even when the mailbox stays quiet.
fn worker_loop(actions: &Receiver<Action>, mut session: Session) {
    loop {
        session.sweep_timeouts();
        loop {
            match actions.try_recv() {
                Ok(Action::Shutdown) | Err(TryRecvError::Disconnected) => return,
                Ok(action) => session.perform(action),
                Err(TryRecvError::Empty) => break,
            }
        }
        let next = if session.awaiting_replies() {
            match actions.recv_timeout(SWEEP_INTERVAL) {
                Ok(action) => Some(action),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        } else {
            match actions.recv() {
                Ok(action) => Some(action),
                Err(_) => return,
            }
        };
        match next {
            Some(Action::Shutdown) => return,
            Some(action) => session.perform(action),
            None => {}
        }
    }
}
