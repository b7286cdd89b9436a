//! # Audio Module
//!
//! Motor de reproducción por guild: cola, reloj, transiciones y supervisión
//! de la conexión de voz.
//!
//! ## Architecture
//!
//! ### [`engine`] - MusicEngine
//! - Owns one [`state::GuildSlot`] per guild
//! - Dispatches [`transport::EngineEvent`]s posted by the voice transport and
//!   the gateway bridge
//! - Persists queue snapshots through a debounced writer
//!
//! ### [`player`] - Transitions
//! - `play_next`, track completion, skip, seek, previous
//! - Every transition for a guild runs under that guild's `play_lock`
//!
//! ### [`supervisor`] - Voice Supervision
//! - Intentional vs. unexpected disconnects, one reconnect attempt
//!
//! ### [`timers`] - Background Maintenance
//! - Idle disconnect, cache sweep, guild purge, now-playing refresh,
//!   voice health checks
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use resonance::audio::MusicEngine;
//! use serenity::all::{ChannelId, GuildId};
//!
//! # async fn example(engine: MusicEngine) -> anyhow::Result<()> {
//! let guild = GuildId::new(123456789);
//! engine.join(guild, ChannelId::new(42)).await?;
//! engine.play(guild, "never gonna give you up", "alice").await?;
//! engine.pause(guild).await?;
//! engine.resume(guild).await?;
//! engine.skip(guild).await?;
//! # Ok(())
//! # }
//! ```

pub mod controls;
pub mod debounce;
pub mod engine;
pub mod notify;
pub mod player;
pub mod queue;
pub mod song;
pub mod state;
pub mod supervisor;
pub mod timecode;
pub mod timers;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use controls::Enqueued;
pub use engine::{EngineDeps, MusicEngine};
pub use notify::{Alert, NotificationSink, NowPlayingView};
pub use player::PlaybackOutcome;
pub use queue::{MusicQueue, QueuePage};
pub use song::{LoopMode, Song};
pub use timers::{BackgroundTimers, GuildMembership};
pub use transport::{
    CompletionNotifier, EngineEvent, SeekMode, SourceSpec, TransportOptions, VoiceConnection,
    VoiceTransport,
};
