//! # Audio Module
//!
//! Per-guild playback for guildtune.
//!
//! - [`queue`]: the state record of one guild (`GuildQueue`) and its
//!   synchronous transitions
//! - [`session`]: the guild map, the event loop and both timers; every
//!   command ends up here
//! - [`stream`]: turns a resolved track into audio, with a fallback provider
//! - [`transport`]: traits the session uses to reach voice and text channels
//!
//! Nothing in this module talks to Discord directly. The songbird and
//! serenity implementations of the transport traits live in `bot`.

pub mod queue;
pub mod session;
pub mod stream;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use session::{EnqueueOutcome, QueueTarget, SessionManager, SessionSettings};
