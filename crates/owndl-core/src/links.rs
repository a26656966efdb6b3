//! Link extraction
//!
//! Finds supported platform links in free-form chat text.

use lazy_regex::lazy_regex;
use std::fmt;

static RE_TIKTOK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"https?://(www\.)?(vt\.tiktok\.com/[\w\-]+/?|vm\.tiktok\.com/[\w\-]+/?|tiktok\.com/@[A-Za-z0-9_.\-]+/video/\d+(\?[^\s]*)?)"i
);
static RE_INSTAGRAM: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"https?://(www\.)?instagram\.com/[A-Za-z0-9_.\-/?=&]+"i);
static RE_YOUTUBE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"https?://(www\.)?(youtube\.com/watch\?v=[A-Za-z0-9_\-]+|youtube\.com/shorts/[A-Za-z0-9_\-]+|youtube\.com/community/[A-Za-z0-9_\-]+|youtube\.com/post/[A-Za-z0-9_\-]+|youtube\.com/channel/[A-Za-z0-9_\-]+/community|youtu\.be/[A-Za-z0-9_\-]+)([&?/][A-Za-z0-9_=.\-]+)*"i
);

/// Platforms the relay knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// tiktok.com short and full video links
    TikTok,
    /// instagram.com posts and reels
    Instagram,
    /// youtube.com videos, shorts and community posts
    YouTube,
}

impl Platform {
    /// All platforms, in extraction order.
    pub const ALL: [Self; 3] = [Self::TikTok, Self::Instagram, Self::YouTube];

    /// Registration tag a worker for this platform announces.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::TikTok => "tiktok",
            Self::Instagram => "instagram",
            Self::YouTube => "youtube",
        }
    }

    fn pattern(self) -> &'static regex::Regex {
        match self {
            Self::TikTok => &RE_TIKTOK,
            Self::Instagram => &RE_INSTAGRAM,
            Self::YouTube => &RE_YOUTUBE,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A link found in a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// Platform the link belongs to.
    pub platform: Platform,
    /// The matched URL.
    pub url: String,
}

/// Extracts at most one link per platform from `text`.
#[must_use]
pub fn extract_links(text: &str) -> Vec<ExtractedLink> {
    Platform::ALL
        .iter()
        .filter_map(|&platform| {
            platform.pattern().find(text).map(|m| ExtractedLink {
                platform,
                url: m.as_str().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tiktok_short_link() {
        let links = extract_links("look https://vt.tiktok.com/ZSabc123/ lol");
        assert_eq!(
            links,
            vec![ExtractedLink {
                platform: Platform::TikTok,
                url: "https://vt.tiktok.com/ZSabc123/".to_string(),
            }]
        );
    }

    #[test]
    fn test_extract_tiktok_full_link_with_query() {
        let links =
            extract_links("https://www.tiktok.com/@some.user/video/7301234567890?is_from_webapp=1 wow");
        assert_eq!(links.len(), 1);
        assert_eq!(
            links[0].url,
            "https://www.tiktok.com/@some.user/video/7301234567890?is_from_webapp=1"
        );
    }

    #[test]
    fn test_extract_youtube_variants() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "https://youtube.com/shorts/abc_DEF-123",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/channel/UC123/community",
        ] {
            let links = extract_links(&format!("see {url} now"));
            assert_eq!(links.len(), 1, "{url}");
            assert_eq!(links[0].platform, Platform::YouTube);
            assert_eq!(links[0].url, url);
        }
    }

    #[test]
    fn test_extract_one_per_platform() {
        let text = "https://www.instagram.com/reel/Cabc/ and https://www.instagram.com/p/Other/ \
                    plus https://youtu.be/xyz";
        let links = extract_links(text);
        let platforms: Vec<Platform> = links.iter().map(|l| l.platform).collect();
        assert_eq!(platforms, vec![Platform::Instagram, Platform::YouTube]);
        assert_eq!(links[0].url, "https://www.instagram.com/reel/Cabc/");
    }

    #[test]
    fn test_extract_case_insensitive_and_empty() {
        assert_eq!(extract_links("HTTPS://YOUTU.BE/abc").len(), 1);
        assert!(extract_links("no links here https://example.com").is_empty());
    }

    #[test]
    fn test_platform_tags() {
        assert_eq!(Platform::TikTok.to_string(), "tiktok");
        assert_eq!(Platform::Instagram.tag(), "instagram");
        assert_eq!(Platform::YouTube.tag(), "youtube");
    }
}
