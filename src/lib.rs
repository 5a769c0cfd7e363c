//! Uniform player surface over GStreamer and libmpv.
//!
//! The crate exposes one set of playback capabilities, an observable
//! [`player::PlayerManager`] for the UI, and a controller actor that owns
//! whichever backend is active.

pub mod config;
pub mod core;
pub mod player;
pub mod ui;
pub mod utils;

#[cfg(test)]
mod test_utils;
