//! Playlist retrieval and segment planning
//!
//! - [`PlaylistFetcher`] downloads the playlist text
//! - [`plan_segments`] turns it into an ordered list of absolute segment URLs

mod fetcher;
mod planner;

pub use fetcher::PlaylistFetcher;
pub(crate) use fetcher::request_error;
pub use planner::plan_segments;
