// JSON renderer for finished comment lists

use serde_json::json;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::DownloadError;
use super::models::{Comment, ContentKind, VideoMetadata};
use super::threads::ThreadBuilder;
use super::traits::CommentSink;
use super::utils::export_path;

/// Writes `<output>/<creator>/<videos|posts>/<title> - comments.json` with
/// replies nested under their parents.
pub struct JsonFileSink {
    output_dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, video: &VideoMetadata, is_filtered: bool) -> PathBuf {
        let creator = video.channel_name.as_deref().unwrap_or("Unknown");
        let title = video.title.as_deref().unwrap_or(&video.video_id);
        export_path(&self.output_dir, creator, title, "json", video.kind, is_filtered)
    }
}

impl CommentSink for JsonFileSink {
    fn name(&self) -> &'static str {
        "json"
    }

    fn write(
        &self,
        video: &VideoMetadata,
        comments: &[Comment],
        filter_label: Option<&str>,
    ) -> Result<(), DownloadError> {
        let path = self.path_for(video, filter_label.is_some());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let roots = ThreadBuilder::build(comments);
        let mut metadata = json!({
            "video_id": video.video_id,
            "kind": video.kind,
            "title": video.title,
            "total_comments": comments.len(),
            "root_comments": roots.len(),
        });
        if video.kind == ContentKind::Post {
            metadata["content"] = json!(video.content);
            metadata["images"] = json!(video.images);
        }
        if let Some(label) = filter_label {
            metadata["filtered_by"] = json!(label);
        }

        let document = json!({ "metadata": metadata, "comments": roots });
        write_atomic(&path, &serde_json::to_vec_pretty(&document)?)?;

        tracing::info!(
            "[Export] {}: wrote {} comment(s) to {}",
            self.name(),
            comments.len(),
            path.display()
        );
        Ok(())
    }
}

/// Write to a sibling `.tmp` file, fsync, then rename over the target
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), DownloadError> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::comment;
    use serde_json::Value;

    fn video() -> VideoMetadata {
        VideoMetadata {
            video_id: "vid00000001".into(),
            title: Some("A: Video".into()),
            channel_id: Some("UCowner".into()),
            channel_name: Some("Owner".into()),
            comment_count: 2,
            ..VideoMetadata::default()
        }
    }

    #[test]
    fn test_writes_threaded_document() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let comments = vec![comment("a", "U", false), comment("a.1", "V", true)];

        sink.write(&video(), &comments, Some("V")).unwrap();

        let path = dir.path().join("Owner/videos/A Video - comments - filtered.json");
        assert_eq!(sink.path_for(&video(), true), path);
        let document: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(document["metadata"]["total_comments"], 2);
        assert_eq!(document["metadata"]["root_comments"], 1);
        assert_eq!(document["metadata"]["filtered_by"], "V");
        assert_eq!(document["comments"][0]["thread_replies"][0]["cid"], "a.1");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_post_goes_to_posts_folder() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let post = VideoMetadata {
            video_id: "UgkxPost".into(),
            kind: ContentKind::Post,
            title: Some("Big news".into()),
            channel_name: Some("Owner".into()),
            content: Some("Big news today".into()),
            images: vec!["https://yt3/large".into()],
            ..VideoMetadata::default()
        };

        sink.write(&post, &[comment("p1", "U", false)], None).unwrap();

        let path = dir.path().join("Owner/posts/Big news - comments.json");
        let document: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(document["metadata"]["kind"], "post");
        assert_eq!(document["metadata"]["content"], "Big news today");
        assert_eq!(document["metadata"]["images"][0], "https://yt3/large");
        assert!(document["metadata"].get("filtered_by").is_none());
    }

    #[test]
    fn test_write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "old contents that are longer").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!dir.path().join("state.tmp").exists());
    }

    #[test]
    fn test_unfiltered_name_without_metadata() {
        let sink = JsonFileSink::new("/out");
        let video = VideoMetadata {
            video_id: "vid00000001".into(),
            ..VideoMetadata::default()
        };
        assert_eq!(
            sink.path_for(&video, false),
            PathBuf::from("/out/Unknown/videos/vid00000001 - comments.json")
        );
    }
}
