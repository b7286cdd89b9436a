//! Resonance: motor de reproducción de música por guild para canales de voz de Discord.

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod sources;
pub mod storage;
pub mod ui;
