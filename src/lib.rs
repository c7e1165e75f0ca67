pub mod downloader;
pub mod queue;

pub use downloader::{
    AuthorFilter, AuthorIdentity, ClientConfig, Comment, CommentSink, ContinuationPaginator,
    DownloadError, JsonFileSink, PlaylistExpander, StorageConfig, ThreadBuilder,
};
pub use queue::{QueueManager, QueueStatus, QueueWorker, WorkerControl};
