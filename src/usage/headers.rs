use axum::http::HeaderMap;

use super::client_ip::header_str;

/// Header names observed in `requests_by_headers_total`. Anything else is
/// ignored so the `header_name` label stays bounded.
pub const TRACKED_HEADERS: [&str; 10] = [
    "User-Agent",
    "Referer",
    "Accept",
    "Accept-Language",
    "Accept-Encoding",
    "Content-Type",
    "Authorization",
    "X-Forwarded-For",
    "X-Real-IP",
    "Origin",
];

pub const MAX_HEADER_VALUE_LEN: usize = 100;

const TRUNCATION_MARKER: &str = "...";
const MASKED_VALUE: &str = "present";

/// Label value recorded for a tracked header.
///
/// Authorization is masked to its presence; long values are cut to
/// `MAX_HEADER_VALUE_LEN` characters plus a `...` marker.
pub fn header_label_value(name: &str, value: &str) -> String {
    if name.eq_ignore_ascii_case("authorization") {
        return MASKED_VALUE.to_string();
    }

    match value.char_indices().nth(MAX_HEADER_VALUE_LEN) {
        Some((cut, _)) => format!("{}{}", &value[..cut], TRUNCATION_MARKER),
        None => value.to_string(),
    }
}

/// `(header_name, label_value)` for every tracked header present and
/// non-empty on the request, in allow-list order.
pub fn tracked_header_labels(headers: &HeaderMap) -> Vec<(&'static str, String)> {
    TRACKED_HEADERS
        .iter()
        .filter_map(|name| {
            header_str(headers, name).map(|value| (*name, header_label_value(name, value)))
        })
        .collect()
}
