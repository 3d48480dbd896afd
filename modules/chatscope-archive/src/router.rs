// Platform detection: host matching on the URL authority. No HTTP.

use url::Url;

use chatscope_common::{PipelineError, Platform, Result};

/// A resolved chat source: which platform, plus whatever identifier the URL carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    pub platform: Platform,
    /// The URL as the user gave it (trimmed).
    pub url: String,
    pub video_id: Option<String>,
}

impl SourceLocator {
    /// Canonical watch URL when the video id is known, otherwise the input URL.
    pub fn canonical_url(&self) -> String {
        match (&self.platform, &self.video_id) {
            (Platform::YouTube, Some(id)) => format!("https://www.youtube.com/watch?v={id}"),
            (Platform::Twitch, Some(id)) => format!("https://www.twitch.tv/videos/{id}"),
            _ => self.url.clone(),
        }
    }
}

/// Resolve a URL into a chat source, or reject it as unsupported.
pub fn resolve(url: &str) -> Result<SourceLocator> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Configuration("URL is empty".into()));
    }

    let parsed = parse_lenient(trimmed)
        .ok_or_else(|| PipelineError::Configuration(format!("not a URL: {trimmed}")))?;
    let platform = detect_platform(&parsed).ok_or_else(|| {
        PipelineError::Configuration(format!("unsupported platform: {trimmed}"))
    })?;

    let video_id = match platform {
        Platform::YouTube => youtube_video_id(&parsed),
        Platform::Twitch => Some(twitch_video_id(&parsed).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "Twitch URL must point to a VOD (/videos/<id>): {trimmed}"
            ))
        })?),
    };

    Ok(SourceLocator {
        platform,
        url: trimmed.to_string(),
        video_id,
    })
}

/// Parse, tolerating a missing scheme ("youtu.be/abc").
fn parse_lenient(input: &str) -> Option<Url> {
    let parsed = Url::parse(input)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("https://{input}")).ok())?;
    match parsed.scheme() {
        "http" | "https" => Some(parsed),
        _ => None,
    }
}

fn detect_platform(url: &Url) -> Option<Platform> {
    let host = url.host_str()?.to_lowercase();
    if host.contains("youtube.com") || host.contains("youtu.be") {
        return Some(Platform::YouTube);
    }
    if host.contains("twitch.tv") {
        return Some(Platform::Twitch);
    }
    None
}

/// "watch?v=ID", "youtu.be/ID", "/live/ID", "/shorts/ID", "/embed/ID".
fn youtube_video_id(url: &Url) -> Option<String> {
    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        return non_empty(&v);
    }
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let first = segments.next()?;
    if url.host_str()?.to_lowercase().contains("youtu.be") {
        return non_empty(first);
    }
    match first {
        "live" | "shorts" | "embed" => non_empty(segments.next()?),
        _ => None,
    }
}

/// "twitch.tv/videos/123456" → "123456".
fn twitch_video_id(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let idx = segments.iter().position(|s| *s == "videos")?;
    let id = segments.get(idx + 1)?;
    if id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_watch_url() {
        let loc = resolve("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=30").unwrap();
        assert_eq!(loc.platform, Platform::YouTube);
        assert_eq!(loc.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            loc.canonical_url(),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
    }

    #[test]
    fn youtube_short_and_live_urls() {
        for url in &[
            "https://youtu.be/abc123",
            "youtu.be/abc123",
            "https://www.youtube.com/live/abc123?feature=share",
            "https://m.youtube.com/shorts/abc123",
        ] {
            let loc = resolve(url).unwrap();
            assert_eq!(loc.platform, Platform::YouTube, "{url}");
            assert_eq!(loc.video_id.as_deref(), Some("abc123"), "{url}");
        }
    }

    #[test]
    fn youtube_without_id_still_resolves() {
        let loc = resolve("https://www.youtube.com/@channel").unwrap();
        assert_eq!(loc.platform, Platform::YouTube);
        assert_eq!(loc.video_id, None);
        assert_eq!(loc.canonical_url(), "https://www.youtube.com/@channel");
    }

    #[test]
    fn twitch_vod_url() {
        let loc = resolve("https://www.twitch.tv/videos/2012345678?t=1h2m").unwrap();
        assert_eq!(loc.platform, Platform::Twitch);
        assert_eq!(loc.video_id.as_deref(), Some("2012345678"));
        assert_eq!(
            loc.canonical_url(),
            "https://www.twitch.tv/videos/2012345678"
        );
    }

    #[test]
    fn twitch_channel_url_is_rejected() {
        assert!(matches!(
            resolve("https://www.twitch.tv/somestreamer"),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn unsupported_hosts_are_configuration_errors() {
        for url in &[
            "https://example.com/watch?v=abc",
            "https://example.com/?next=youtube.com",
            "ftp://youtube.com/watch?v=abc",
            "not a url at all",
            "",
        ] {
            assert!(
                matches!(resolve(url), Err(PipelineError::Configuration(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn host_match_is_case_insensitive() {
        let loc = resolve("https://WWW.YouTube.COM/watch?v=X1").unwrap();
        assert_eq!(loc.platform, Platform::YouTube);
    }
}
