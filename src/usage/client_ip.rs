use axum::http::HeaderMap;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED: &str = "x-forwarded";

/// Best-guess client IP for a request.
///
/// Proxy headers are consulted most-specific first (`X-Forwarded-For`,
/// `X-Real-IP`, `X-Forwarded`), then the transport peer address. Header values
/// are taken verbatim and never validated as IP syntax, so a client that can
/// reach this hop without passing a trusted proxy can choose its own label.
pub fn resolve_client_ip(headers: &HeaderMap, peer_addr: &str) -> String {
    if let Some(xff) = header_str(headers, X_FORWARDED_FOR) {
        // First hop, even if it is blank after trimming
        let first = xff.split(',').next().unwrap_or_default();
        return first.trim().to_string();
    }

    if let Some(real_ip) = header_str(headers, X_REAL_IP) {
        return real_ip.to_string();
    }

    if let Some(forwarded) = header_str(headers, X_FORWARDED) {
        return forwarded.to_string();
    }

    peer_host(peer_addr).to_string()
}

/// Host part of a `host:port` or `[v6]:port` peer address.
pub fn peer_host(peer_addr: &str) -> &str {
    if peer_addr.starts_with('[') {
        return match peer_addr.find(']') {
            Some(end) => &peer_addr[..=end],
            None => peer_addr,
        };
    }

    match peer_addr.split_once(':') {
        Some((host, _)) => host,
        None => peer_addr,
    }
}

/// First value of a header as a non-empty string.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    #[test]
    fn test_xff_single_ip() {
        let h = headers(&[("X-Forwarded-For", "203.0.113.5")]);
        assert_eq!(resolve_client_ip(&h, "10.0.0.1:1234"), "203.0.113.5");
    }

    #[test]
    fn test_xff_takes_first_hop() {
        let h = headers(&[("X-Forwarded-For", "a, b, c")]);
        assert_eq!(resolve_client_ip(&h, "10.0.0.1:1234"), "a");
    }

    #[test]
    fn test_xff_trims_whitespace() {
        let h = headers(&[("X-Forwarded-For", "  203.0.113.5  , 198.51.100.1")]);
        assert_eq!(resolve_client_ip(&h, "10.0.0.1:1234"), "203.0.113.5");
    }

    #[test]
    fn test_xff_blank_first_hop_is_returned() {
        let h = headers(&[("X-Forwarded-For", " , 198.51.100.1"), ("X-Real-IP", "10.9.9.9")]);
        assert_eq!(resolve_client_ip(&h, "10.0.0.1:1234"), "");
    }

    #[test]
    fn test_xff_not_validated() {
        let h = headers(&[("X-Forwarded-For", "not-an-ip")]);
        assert_eq!(resolve_client_ip(&h, "10.0.0.1:1234"), "not-an-ip");
    }

    #[test]
    fn test_empty_xff_falls_through_to_real_ip() {
        let h = headers(&[("X-Forwarded-For", ""), ("X-Real-IP", "198.51.100.7")]);
        assert_eq!(resolve_client_ip(&h, "10.0.0.1:1234"), "198.51.100.7");
    }

    #[test]
    fn test_priority_order() {
        let h = headers(&[
            ("X-Forwarded", "192.0.2.3"),
            ("X-Real-IP", "192.0.2.2"),
            ("X-Forwarded-For", "192.0.2.1, 10.0.0.2"),
        ]);
        assert_eq!(resolve_client_ip(&h, "10.0.0.1:1234"), "192.0.2.1");

        let h = headers(&[("X-Forwarded", "192.0.2.3"), ("X-Real-IP", "192.0.2.2")]);
        assert_eq!(resolve_client_ip(&h, "10.0.0.1:1234"), "192.0.2.2");

        let h = headers(&[("X-Forwarded", "192.0.2.3")]);
        assert_eq!(resolve_client_ip(&h, "10.0.0.1:1234"), "192.0.2.3");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let h = headers(&[("x-real-ip", "198.51.100.7")]);
        assert_eq!(resolve_client_ip(&h, ""), "198.51.100.7");
    }

    #[test]
    fn test_only_first_value_is_read() {
        let h = headers(&[("X-Real-IP", "198.51.100.7"), ("X-Real-IP", "198.51.100.8")]);
        assert_eq!(resolve_client_ip(&h, ""), "198.51.100.7");
    }

    #[test]
    fn test_peer_address_ipv4() {
        assert_eq!(
            resolve_client_ip(&HeaderMap::new(), "203.0.113.195:45678"),
            "203.0.113.195"
        );
    }

    #[test]
    fn test_peer_address_ipv6_bracketed() {
        assert_eq!(
            resolve_client_ip(&HeaderMap::new(), "[2001:db8::1]:8080"),
            "[2001:db8::1]"
        );
        assert_eq!(resolve_client_ip(&HeaderMap::new(), "[::1]:443"), "[::1]");
    }

    #[test]
    fn test_peer_address_without_port() {
        assert_eq!(resolve_client_ip(&HeaderMap::new(), "localhost"), "localhost");
        assert_eq!(resolve_client_ip(&HeaderMap::new(), ""), "");
    }

    #[test]
    fn test_unterminated_bracket_returned_unchanged() {
        assert_eq!(peer_host("[2001:db8::1"), "[2001:db8::1");
    }
}
