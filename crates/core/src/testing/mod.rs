//! Testing utilities and mock implementations.
//!
//! Mocks for the two external seams (transfer engine, feed fetching) so the
//! fleet and every background subsystem can be tested without a real client.
//!
//! # Example
//!
//! ```rust,ignore
//! use tamer_core::testing::{test_magnet, MockEngine, MockFeedFetcher};
//!
//! let engine = MockEngine::new();
//! let fetcher = MockFeedFetcher::new();
//! fetcher.set_feed("https://example.org/rss", rss_feed(&[("Ubuntu 24.04", &test_magnet(1, "Ubuntu 24.04"))])).await;
//! ```

mod mock_engine;
mod mock_fetcher;

pub use mock_engine::{MockEngine, MockHandle, MockTorrent, RecordedAdd, MOCK_FILE_COUNT};
pub use mock_fetcher::MockFeedFetcher;

/// A well-formed magnet link with a deterministic info hash.
pub fn test_magnet(n: u32, name: &str) -> String {
    format!(
        "magnet:?xt=urn:btih:{:040x}&dn={}",
        n,
        urlencoding::encode(name)
    )
}

/// Build an RSS 2.0 document; each item is (title, link).
pub fn rss_feed(items: &[(&str, &str)]) -> Vec<u8> {
    let mut body = String::from(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>test</title><link>https://example.org</link><description>test feed</description>",
    );
    for (title, link) in items {
        body.push_str(&format!(
            "<item><title>{}</title><link>{}</link><guid>{}</guid></item>",
            xml_escape(title),
            xml_escape(link),
            xml_escape(link)
        ));
    }
    body.push_str("</channel></rss>");
    body.into_bytes()
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
