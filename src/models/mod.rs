mod movie;
mod tracking;

pub use movie::{MovieId, MovieRecord, TmdbMovie, TmdbPage};
pub use tracking::{RecordId, TrackingEntry, UserId, WatchStatus};
