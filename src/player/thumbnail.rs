use image::RgbaImage;
use image::imageops::{self, FilterType};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::inflight::LatestRequest;
use super::types::{Thumbnail, ThumbnailCompletion};

pub type FrameCallback = Box<dyn FnOnce(Option<RgbaImage>) + Send + 'static>;

/// Frame grabber bound to one loaded media item, provided by an engine.
///
/// `grab` must call `done` exactly once, from any thread, and must not block
/// the caller while decoding.
pub trait ThumbnailSource: Send + Sync {
    fn grab(&self, seconds: f64, done: FrameCallback);
}

/// Lazily created per-item thumbnail generator with one request in flight.
pub struct ThumbnailGenerator {
    owner: &'static str,
    max_width: u32,
    source: Mutex<Option<Arc<dyn ThumbnailSource>>>,
    request: LatestRequest<Option<Thumbnail>>,
}

impl ThumbnailGenerator {
    pub fn new(owner: &'static str, max_width: u32) -> Self {
        Self {
            owner,
            max_width,
            source: Mutex::new(None),
            request: LatestRequest::new("thumbnail"),
        }
    }

    /// Generate a frame at `seconds`. `make_source` runs only while no source
    /// exists yet; returning None means there is no media to grab from.
    pub fn generate<F>(&self, seconds: f64, make_source: F) -> ThumbnailCompletion
    where
        F: FnOnce() -> Option<Arc<dyn ThumbnailSource>>,
    {
        let (ticket, completion) = self.request.begin();

        let source = {
            let mut guard = self.source.lock().unwrap();
            if guard.is_none() {
                *guard = make_source();
                if guard.is_some() {
                    debug!("{}: thumbnail generator created", self.owner);
                }
            }
            guard.clone()
        };

        let max_width = self.max_width;
        match source {
            Some(source) => source.grab(
                seconds,
                Box::new(move |frame| {
                    if !ticket.is_current() {
                        return;
                    }
                    ticket.complete(frame.map(|image| Thumbnail {
                        time: seconds,
                        image: fit_width(image, max_width),
                    }));
                }),
            ),
            None => {
                warn!("{}: no media available for thumbnail generation", self.owner);
                ticket.complete(None);
            }
        }

        completion
    }

    /// Drop the generator bound to the previous item and resolve any pending request.
    pub fn reset(&self) {
        self.request.cancel();
        self.source.lock().unwrap().take();
    }

    pub fn has_source(&self) -> bool {
        self.source.lock().unwrap().is_some()
    }
}

/// Downscale `image` to at most `max_width` pixels wide, keeping its aspect ratio.
fn fit_width(image: RgbaImage, max_width: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if max_width == 0 || width <= max_width {
        return image;
    }
    let scaled_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;
    imageops::resize(&image, max_width, scaled_height, FilterType::Triangle)
}
