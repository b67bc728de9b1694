// InfoProbe: metadata-only background query
//
// Fire-and-forget: no cancellation once started. A caller that stops
// caring simply drops the handle and the result is discarded. Single
// items get a best-effort thumbnail fetch so a presentation layer can
// show a preview without touching the network itself.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::engine::Engine;
use crate::models::MediaInfo;

const THUMBNAIL_TIMEOUT_SECS: u64 = 10;

/// Result of one probe, delivered exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent {
    Info(Box<MediaInfo>),
    Error(String),
}

pub struct ProbeHandle {
    events: UnboundedReceiver<ProbeEvent>,
}

impl ProbeHandle {
    /// Wait for the probe to resolve. `None` only if the probe task was
    /// torn down without reporting, which does not happen in practice.
    pub async fn recv(mut self) -> Option<ProbeEvent> {
        self.events.recv().await
    }
}

/// Query metadata for one source on a background task.
pub fn spawn_probe(engine: Arc<dyn Engine>, url: String) -> ProbeHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let event = match engine.probe(&url).await {
            Ok(mut info) => {
                if let MediaInfo::Single(item) = &mut info {
                    item.thumbnail_data = fetch_thumbnail(item.thumbnail.as_deref()).await;
                }
                ProbeEvent::Info(Box::new(info))
            }
            Err(e) => ProbeEvent::Error(e.to_string()),
        };
        let _ = tx.send(event);
    });

    ProbeHandle { events: rx }
}

/// Best-effort thumbnail download. Every failure degrades to `None`
/// with a warning; it never fails the probe.
async fn fetch_thumbnail(url: Option<&str>) -> Option<Vec<u8>> {
    let url = url?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(THUMBNAIL_TIMEOUT_SECS))
        .build()
        .ok()?;

    let response = match client.get(url).send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(e) => {
            eprintln!("[Probe] warning: thumbnail fetch failed: {}", e);
            return None;
        }
    };

    match response.bytes().await {
        Ok(bytes) => Some(bytes.to_vec()),
        Err(e) => {
            eprintln!("[Probe] warning: thumbnail read failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::engine::EventSink;
    use crate::errors::FetchError;
    use crate::models::{FetchOptions, ItemInfo, PlaylistEntry, PlaylistInfo};

    struct FakeProbeEngine {
        result: Result<MediaInfo, FetchError>,
    }

    #[async_trait]
    impl Engine for FakeProbeEngine {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch(
            &self,
            _options: &FetchOptions,
            _sink: &mut dyn EventSink,
        ) -> Result<(), FetchError> {
            Err(FetchError::Unknown("not fetched in these tests".to_string()))
        }

        async fn probe(&self, _url: &str) -> Result<MediaInfo, FetchError> {
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn test_playlist_probe_resolves_with_entries() {
        let playlist = MediaInfo::Playlist(PlaylistInfo {
            title: "Mix".to_string(),
            entries: vec![PlaylistEntry {
                id: "a1".to_string(),
                title: "First".to_string(),
                duration: Some(30.0),
            }],
        });
        let engine = Arc::new(FakeProbeEngine {
            result: Ok(playlist.clone()),
        });

        let event = spawn_probe(engine, "https://example.com/pl".to_string())
            .recv()
            .await;
        assert_eq!(event, Some(ProbeEvent::Info(Box::new(playlist))));
    }

    #[tokio::test]
    async fn test_single_item_without_thumbnail_skips_fetch() {
        let item = MediaInfo::Single(ItemInfo {
            title: "Solo".to_string(),
            duration: Some(10.0),
            uploader: "someone".to_string(),
            thumbnail: None,
            thumbnail_data: None,
        });
        let engine = Arc::new(FakeProbeEngine {
            result: Ok(item.clone()),
        });

        let event = spawn_probe(engine, "https://example.com/v".to_string())
            .recv()
            .await;
        assert_eq!(event, Some(ProbeEvent::Info(Box::new(item))));
    }

    #[tokio::test]
    async fn test_probe_error_is_delivered_not_thrown() {
        let engine = Arc::new(FakeProbeEngine {
            result: Err(FetchError::Engine("ERROR: no such video".to_string())),
        });

        let event = spawn_probe(engine, "https://example.com/v".to_string())
            .recv()
            .await;
        match event {
            Some(ProbeEvent::Error(message)) => assert!(message.contains("no such video")),
            other => panic!("expected probe error, got {:?}", other),
        }
    }
}
