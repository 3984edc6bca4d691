use url::Url;

const POST_KINDS: &[&str] = &["p", "reel", "reels", "tv"];
const HOST: &str = "instagram.com";

fn is_instagram_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == HOST || host.ends_with(".instagram.com")
}

/// Extract a post's shortcode from its URL.
///
/// Accepts `/p/<code>`, `/reel/<code>`, `/reels/<code>` and `/tv/<code>`,
/// optionally behind a username segment, on `instagram.com` or one of its
/// subdomains. Query strings, fragments and trailing slashes are ignored.
pub fn shortcode_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    if !url.host_str().is_some_and(is_instagram_host) {
        return None;
    }

    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    segments
        .windows(2)
        .find(|pair| POST_KINDS.contains(&pair[0]))
        .map(|pair| pair[1])
        .filter(|code| {
            code.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
        .map(String::from)
}
