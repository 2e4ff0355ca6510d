//! HTTP fixtures: an origin serving playlists and segments

use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock CDN serving `/<name>/index.m3u8` and its segments
pub struct Origin {
    pub server: MockServer,
}

impl Origin {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.server.uri(), route)
    }

    /// Serve a playlist of `count` segments under `seg/NNNN.ts`
    ///
    /// Segment `i` has the body `<name>:<i>;`; indices in `failing` answer 500.
    pub async fn playlist(&self, name: &str, count: usize, failing: &[usize]) -> String {
        self.playlist_with_delay(name, count, failing, Duration::ZERO)
            .await
    }

    pub async fn playlist_with_delay(
        &self,
        name: &str,
        count: usize,
        failing: &[usize],
        delay: Duration,
    ) -> String {
        let mut body = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:4\n\n");
        for i in 0..count {
            body.push_str(&format!("#EXTINF:4.0,\nseg/{i:04}.ts\n"));
            let response = if failing.contains(&i) {
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200)
                    .set_body_bytes(segment_body(name, i))
                    .set_delay(delay)
            };
            Mock::given(method("GET"))
                .and(path(format!("/{name}/seg/{i:04}.ts")))
                .respond_with(response)
                .mount(&self.server)
                .await;
        }
        body.push_str("#EXT-X-ENDLIST\n");
        self.serve(&format!("/{name}/index.m3u8"), 200, &body).await
    }

    /// Serve `body` with `status` at `route`, returning its URL
    pub async fn serve(&self, route: &str, status: u16, body: &str) -> String {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
        self.url(route)
    }
}

/// Expected bytes of segment `index` of playlist `name`
pub fn segment_body(name: &str, index: usize) -> Vec<u8> {
    format!("{name}:{index};").into_bytes()
}

/// Expected merged bytes for `name` with segments `indices`
pub fn merged_body(name: &str, indices: impl IntoIterator<Item = usize>) -> Vec<u8> {
    indices
        .into_iter()
        .flat_map(|i| segment_body(name, i))
        .collect()
}
