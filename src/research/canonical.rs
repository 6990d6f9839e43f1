// src/research/canonical.rs — Canonical source identity
//
// Two URLs that point at the same document should dedupe to one source.

use url::{form_urlencoded, Url};

/// Query parameters that only track the click and never change the document.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "mc_cid", "mc_eid", "ref", "ref_src", "igshid", "msclkid",
];

/// Normalize a URL into a stable identity.
///
/// Lowercases scheme and host, strips `www.`, default ports, fragments and
/// tracking parameters (`utm_*` and friends), sorts the remaining parameters,
/// and drops a trailing slash. Unparseable input falls back to its trimmed,
/// lowercased form.
pub fn canonical_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_lowercase();
    };

    let host = url
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_lowercase())
        .unwrap_or_default();

    let mut out = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(url.path().trim_end_matches('/'));

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !params.is_empty() {
        params.sort();
        // Re-encode so a decoded `&` or `=` inside a value stays part of it.
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &params {
            if v.is_empty() {
                query.append_key_only(k);
            } else {
                query.append_pair(k, v);
            }
        }
        out.push('?');
        out.push_str(&query.finish());
    }
    out
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_www_insensitive() {
        assert_eq!(
            canonical_id("HTTPS://WWW.Example.com/Path"),
            canonical_id("https://example.com/Path")
        );
    }

    #[test]
    fn test_fragment_and_trailing_slash_removed() {
        assert_eq!(
            canonical_id("https://example.com/a/#section"),
            "https://example.com/a"
        );
        assert_eq!(canonical_id("https://example.com/"), "https://example.com");
    }

    #[test]
    fn test_tracking_params_removed_and_rest_sorted() {
        assert_eq!(
            canonical_id("https://example.com/p?b=2&utm_source=x&a=1&fbclid=zz"),
            "https://example.com/p?a=1&b=2"
        );
    }

    #[test]
    fn test_encoded_separators_stay_distinct() {
        let encoded = canonical_id("https://example.com/s?q=a%26b");
        let split = canonical_id("https://example.com/s?q=a&b");
        assert_ne!(encoded, split);
        assert_eq!(encoded, "https://example.com/s?q=a%26b");
        assert_eq!(split, "https://example.com/s?b&q=a");
    }

    #[test]
    fn test_equivalent_encodings_match() {
        assert_eq!(
            canonical_id("https://example.com/s?q=rust+async"),
            canonical_id("https://example.com/s?q=rust%20async")
        );
    }

    #[test]
    fn test_default_port_dropped_custom_kept() {
        assert_eq!(canonical_id("https://example.com:443/x"), "https://example.com/x");
        assert_eq!(
            canonical_id("http://example.com:8080/x"),
            "http://example.com:8080/x"
        );
    }

    #[test]
    fn test_path_case_preserved() {
        assert_ne!(
            canonical_id("https://example.com/Doc"),
            canonical_id("https://example.com/doc")
        );
    }

    #[test]
    fn test_unparseable_fallback() {
        assert_eq!(canonical_id("  Not A URL/ "), "not a url");
    }
}
