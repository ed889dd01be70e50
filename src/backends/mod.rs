pub mod http;
pub mod playlist;
pub mod traits;

pub use http::HttpBackend;
pub use traits::{
    ChangeSourceRequest, ChangeSourceResolution, FavoriteEntry, FavoriteRecord, FavoriteState,
    IdentityResolution, PlaybackBackend, PlayerConfigUpdate, ProgressRecord, QueryRequest,
    QueryResolution, SkipConfigResult,
};
