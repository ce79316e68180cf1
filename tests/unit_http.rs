use ghutil::http::{
    encode_path_segment, extract_rate_from_rest, is_rate_limited, last_page_from_link,
    map_status_to_error,
};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

#[test]
fn status_error_mapping() {
    let e = map_status_to_error(StatusCode::NOT_FOUND, "Not Found".into());
    assert_eq!(e.code, "not_found");
    assert_eq!(e.message, "Not Found");
}

#[test]
fn rest_rate_headers() {
    let mut h = HeaderMap::new();
    h.insert("x-ratelimit-remaining", "4999".parse().unwrap());
    h.insert("x-ratelimit-used", "1".parse().unwrap());
    // Use a fixed epoch for deterministic test
    h.insert("x-ratelimit-reset", "1700000000".parse().unwrap());
    let rate = extract_rate_from_rest(&h).unwrap();
    assert_eq!(rate.remaining, 4999);
    assert_eq!(rate.reset_at.timestamp(), 1_700_000_000);
    assert!(!is_rate_limited(StatusCode::FORBIDDEN, Some(&rate)));
}

#[test]
fn rate_needs_both_headers() {
    let mut h = HeaderMap::new();
    h.insert("x-ratelimit-remaining", "0".parse().unwrap());
    assert!(extract_rate_from_rest(&h).is_none());
}

#[test]
fn link_header_last_page() {
    let mut h = HeaderMap::new();
    h.insert(
        "link",
        "<https://api.github.com/repositories/1/issues?page=2&per_page=100>; rel=\"next\", <https://api.github.com/repositories/1/issues?per_page=100&page=7>; rel=\"last\""
            .parse()
            .unwrap(),
    );
    assert_eq!(last_page_from_link(&h), Some(7));
}

#[test]
fn link_header_without_last() {
    let mut h = HeaderMap::new();
    // The final page only links back.
    h.insert(
        "link",
        "<https://api.github.com/repositories/1/issues?page=1>; rel=\"first\", <https://api.github.com/repositories/1/issues?page=6>; rel=\"prev\""
            .parse()
            .unwrap(),
    );
    assert_eq!(last_page_from_link(&h), None);
    assert_eq!(last_page_from_link(&HeaderMap::new()), None);
}

#[test]
fn url_path_segment_encoding() {
    // Spaces, slash, percent and unicode should be percent-encoded
    assert_eq!(encode_path_segment("good first/issue%"), "good%20first%2Fissue%25");
    // Unreserved characters remain as-is
    assert_eq!(encode_path_segment("abc-._~123"), "abc-._~123");
}
