#[cfg(feature = "gstreamer")]
mod bus_handler;
pub mod engine;
#[cfg(feature = "gstreamer")]
pub mod playbin;
