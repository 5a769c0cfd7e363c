pub mod controls;

pub use controls::{
    BottomControls, ControlSlot, PLAYBACK_SPEEDS, PipButton, PlaybackTimeLabel, SpeedEntry,
    SpeedMenu, format_time, streaming_info_rows,
};
