// In-memory channel directory

use std::collections::HashMap;
use std::sync::RwLock;

use super::traits::ChannelDirectory;

/// Channel id → most recently seen display name
#[derive(Default)]
pub struct MemoryChannelDirectory {
    channels: RwLock<HashMap<String, String>>,
}

impl MemoryChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.channels.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChannelDirectory for MemoryChannelDirectory {
    fn register(&self, channel_id: &str, display_name: &str) {
        if channel_id.is_empty() {
            return;
        }
        if let Ok(mut channels) = self.channels.write() {
            channels.insert(channel_id.to_string(), display_name.to_string());
        }
    }

    fn display_name(&self, channel_id: &str) -> Option<String> {
        self.channels.read().ok()?.get(channel_id).cloned()
    }
}
