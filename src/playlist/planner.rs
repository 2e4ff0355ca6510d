//! Playlist parsing into an ordered segment plan

use crate::error::{Error, Result};
use url::Url;

/// Parse playlist text into absolute segment URLs, in order of appearance
///
/// Blank lines and lines starting with `#` (tags and comments) are ignored.
/// Absolute `http://`/`https://` references are taken as-is; anything else
/// is resolved against the playlist's directory. References that cannot be
/// resolved are skipped with a warning.
///
/// # Examples
///
/// ```
/// use hls_dl::playlist::plan_segments;
///
/// let text = "#EXTM3U\n#EXTINF:10,\nseg/0001.ts\n";
/// let urls = plan_segments(text, "http://h/a/b/list.m3u8").unwrap();
/// assert_eq!(urls[0].as_str(), "http://h/a/b/seg/0001.ts");
/// ```
pub fn plan_segments(text: &str, playlist_url: &str) -> Result<Vec<Url>> {
    let base = Url::parse(playlist_url)
        .map_err(|e| Error::Validation(format!("invalid playlist URL {playlist_url}: {e}")))?;

    let mut segments = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let resolved = if line.starts_with("http://") || line.starts_with("https://") {
            Url::parse(line)
        } else {
            base.join(line)
        };

        match resolved {
            Ok(url) => segments.push(url),
            Err(e) => {
                tracing::warn!(line, error = %e, "skipping unresolvable segment reference");
            }
        }
    }

    Ok(segments)
}
