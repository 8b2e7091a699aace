//! # Audio Module
//!
//! Per-guild playback orchestration for the radio bot.
//!
//! This module decides, for every guild, what is playing, what plays next,
//! how failures are absorbed and when an idle session is torn down. It does
//! no decoding and no rendering itself; those live behind the ports in
//! [`transport`] and [`now_playing`].
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Sequencer
//! - Entry point for play/queue/radio/stop/skip/pause/rewind/shuffle
//! - Decides the next clip on every completion: queue first, then radio, else idle
//!
//! ### [`scheduler`] - Completion Bridge
//! - The voice driver reports "clip ended" from its own threads
//! - The bridge forwards that into the runtime through a channel
//!
//! ### [`radio`] - Radio Mode
//! - Random picks with metadata-only prefetch
//! - Capped exponential backoff between failed attempts
//!
//! ### [`now_playing`] - Player Message
//! - One message per guild, edited in place
//! - Periodic progress refresh while something is playing
//!
//! ### [`reaper`] - Idle Reaper
//! - Polling sweep against an idle threshold
//! - Immediate teardown when the voice channel empties
//!
//! ### [`stats`] - Listening Stats
//! - Plays, listen time and top songs/eras per requester
//!
//! ## Concurrency
//!
//! Each guild's [`session::SessionState`] sits behind its own async mutex in
//! the [`session::SessionStore`]. Every transition holds that lock from start
//! to end, so a guild never sees two transitions interleave. The periodic
//! loops only `try_lock` and pass over a busy guild until their next tick;
//! a slow guild never holds up the others.

pub mod now_playing;
pub mod player;
pub mod queue;
pub mod radio;
pub mod reaper;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod transport;

#[cfg(test)]
pub mod testing;
