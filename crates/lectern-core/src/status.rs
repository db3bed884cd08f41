//! Ingest server status document parsing
//!
//! Extracts live streams from the nginx-rtmp `stat` XML document:
//! - Applications and their live streams
//! - Whether each stream currently has a publisher
//! - Which publishing key a viewer on a stale key should switch to
//!
//! The document is small and flat, so it is scanned with string operations
//! rather than a full XML parser.

use crate::{types::BroadcastKey, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One live stream listed by the ingest server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub application: String,
    pub name: String,
    pub publishing: bool,
}

/// Parse every live stream in a `stat` document
pub fn parse_stat(xml: &str) -> Result<Vec<StreamStatus>> {
    if !xml.contains("<rtmp") {
        return Err(Error::StatusParse("missing <rtmp> root element".into()));
    }

    let mut streams = Vec::new();

    for app_chunk in xml.split("<application>").skip(1) {
        let app = section(app_chunk, "</application>");

        // The application name precedes its <live> block
        let header = app.split("<live>").next().unwrap_or(app);
        let Some(application) = element_text(header, "name") else {
            return Err(Error::StatusParse("application without <name>".into()));
        };

        let Some(live_start) = app.find("<live>") else {
            continue;
        };
        let live = section(&app[live_start..], "</live>");

        for stream_chunk in live.split("<stream>").skip(1) {
            let stream = section(stream_chunk, "</stream>");
            let Some(name) = element_text(stream, "name") else {
                debug!(application, "Skipping stream without name");
                continue;
            };

            streams.push(StreamStatus {
                application: application.to_string(),
                name: name.to_string(),
                publishing: stream.contains("<publishing/>") || stream.contains("<publishing />"),
            });
        }
    }

    Ok(streams)
}

/// Keys currently being published to `application`
pub fn active_keys(xml: &str, application: &str) -> Result<Vec<BroadcastKey>> {
    let keys = parse_stat(xml)?
        .into_iter()
        .filter(|stream| stream.publishing && stream.application == application)
        .filter_map(|stream| match BroadcastKey::new(stream.name) {
            Ok(key) => Some(key),
            Err(err) => {
                debug!(error = %err, "Ignoring stream with unusable name");
                None
            }
        })
        .collect();

    Ok(keys)
}

/// Key to switch to, given the keys currently publishing.
///
/// Nothing publishing is not evidence of a stale key, and neither is the
/// viewer's own key being among several.
pub fn resync_candidate(current: &BroadcastKey, publishing: &[BroadcastKey]) -> Option<BroadcastKey> {
    if publishing.contains(current) {
        return None;
    }
    publishing.first().cloned()
}

/// Text up to the closing tag, or the whole chunk if it is missing
fn section<'a>(chunk: &'a str, close: &str) -> &'a str {
    match chunk.find(close) {
        Some(end) => &chunk[..end],
        None => chunk,
    }
}

/// Trimmed text of the first `<tag>...</tag>` element
fn element_text<'a>(content: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let start = content.find(&open)? + open.len();
    let end = content[start..].find(&close)? + start;
    let text = content[start..end].trim();

    (!text.is_empty()).then_some(text)
}
