pub mod errors;

pub use errors::PlayerError;

use std::path::Path;
use url::Url;

/// Turn user input into a media URL. Anything that does not parse as a URL
/// with a scheme is treated as a local path.
pub fn media_url(input: &str) -> Result<Url, PlayerError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PlayerError::InvalidLocation("empty location".to_string()));
    }

    // Single letter schemes are drive letters, not URLs
    if let Ok(url) = Url::parse(input)
        && url.scheme().len() > 1
    {
        return Ok(url);
    }

    let path = Path::new(input);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| PlayerError::InvalidLocation(format!("{}: {}", input, e)))?
            .join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|_| PlayerError::InvalidLocation(absolute.display().to_string()))
}
