//! Base-URL formatting and relative-path joining.

use std::net::SocketAddr;

/// Render `scheme://ip:port` for a bound address.
///
/// IPv6 addresses come out bracketed (`http://[::1]:8080`).
pub fn base_url(scheme: &str, addr: SocketAddr) -> String {
    format!("{scheme}://{addr}")
}

/// Join `path` onto `base` with exactly one `/` between them.
///
/// An empty path yields `base` unchanged; a path that already starts with
/// `/` is appended as-is; anything else gets a `/` inserted. `base` is never
/// inspected, so a trailing slash on it is the caller's business.
pub fn absolute_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_owned();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://127.0.0.1:53262";

    #[test]
    fn empty_path_is_base() {
        assert_eq!(absolute_url(BASE, ""), BASE);
    }

    #[test]
    fn leading_slash_is_not_doubled() {
        assert_eq!(absolute_url(BASE, "/my/path"), "http://127.0.0.1:53262/my/path");
        assert_eq!(absolute_url(BASE, "/"), "http://127.0.0.1:53262/");
    }

    #[test]
    fn missing_slash_is_inserted() {
        assert_eq!(absolute_url(BASE, "my/path"), "http://127.0.0.1:53262/my/path");
        assert_eq!(absolute_url(BASE, "hello?name=world"), "http://127.0.0.1:53262/hello?name=world");
    }

    #[test]
    fn query_only_path_gets_slash() {
        assert_eq!(absolute_url(BASE, "?a=1"), "http://127.0.0.1:53262/?a=1");
    }

    #[test]
    fn base_url_v4() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(base_url("http", addr), "http://127.0.0.1:8080");
    }

    #[test]
    fn base_url_v6_is_bracketed() {
        let addr: SocketAddr = "[::1]:8443".parse().unwrap();
        assert_eq!(base_url("https", addr), "https://[::1]:8443");
    }
}
