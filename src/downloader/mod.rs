// Downloader module - comment retrieval, threading and filtering

pub mod directory;
pub mod errors;
pub mod export;
pub mod filters;
pub mod models;
pub mod paginator;
pub mod playlist;
pub mod threads;
pub mod traits;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use directory::MemoryChannelDirectory;
pub use errors::DownloadError;
pub use export::JsonFileSink;
pub use filters::{AuthorFilter, AuthorIdentity, DateFilter, DatePreset};
pub use models::{
    ClientConfig, Comment, ContentKind, PlaylistEntry, SortOrder, StorageConfig, VideoMetadata,
};
pub use paginator::{CommentStream, ContinuationPaginator};
pub use playlist::PlaylistExpander;
pub use threads::{ThreadBuilder, ThreadNode};
pub use traits::{ChannelDirectory, CommentSink, Transport};
pub use transport::ReqwestTransport;
