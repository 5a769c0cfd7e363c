pub mod engine;
#[cfg(feature = "mpv")]
pub mod libmpv;
