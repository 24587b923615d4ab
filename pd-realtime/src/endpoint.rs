//! Socket endpoint derivation from the page origin.

use reqwest::Url;

use pd_core::constants::WS_USER_QUERY_PARAM;
use pd_core::error::{PdError, PdResult};

/// Build `<ws|wss>://host[:port]<ws_path>?userId=<id>` from an origin.
///
/// `https` maps to `wss`, `http` to `ws`; socket schemes pass through. Any
/// path or query on the origin is discarded, so the result is stable across
/// reconnects for one identity.
pub fn socket_url(origin: &str, ws_path: &str, user_id: &str) -> PdResult<String> {
    let parsed = Url::parse(origin.trim())
        .map_err(|e| PdError::Config(format!("invalid origin {origin:?}: {e}")))?;

    let scheme = match parsed.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(PdError::Config(format!(
                "unsupported origin scheme {other:?}"
            )))
        }
    };

    let host = parsed
        .host_str()
        .ok_or_else(|| PdError::Config(format!("origin {origin:?} has no host")))?;
    let authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut url = Url::parse(&format!("{scheme}://{authority}"))
        .map_err(|e| PdError::Config(format!("invalid socket url: {e}")))?;
    url.set_path(ws_path);
    url.query_pairs_mut().append_pair(WS_USER_QUERY_PARAM, user_id);

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_mapping() {
        assert_eq!(
            socket_url("https://app.postdeck.io", "/ws", "u1").unwrap(),
            "wss://app.postdeck.io/ws?userId=u1"
        );
        assert_eq!(
            socket_url("http://localhost:3000/", "/ws", "u1").unwrap(),
            "ws://localhost:3000/ws?userId=u1"
        );
        assert_eq!(
            socket_url("wss://rt.postdeck.io:8443", "/ws", "u1").unwrap(),
            "wss://rt.postdeck.io:8443/ws?userId=u1"
        );
    }

    #[test]
    fn test_origin_path_and_query_dropped() {
        assert_eq!(
            socket_url("https://app.postdeck.io/dashboard?tab=1", "/ws", "u2").unwrap(),
            "wss://app.postdeck.io/ws?userId=u2"
        );
    }

    #[test]
    fn test_user_id_is_encoded() {
        let url = socket_url("http://127.0.0.1:8080", "/ws", "a b&c").unwrap();
        assert_eq!(url, "ws://127.0.0.1:8080/ws?userId=a+b%26c");
    }

    #[test]
    fn test_rejects_bad_origins() {
        assert!(socket_url("ftp://files.example.com", "/ws", "u1").is_err());
        assert!(socket_url("not a url", "/ws", "u1").is_err());
    }

    #[test]
    fn test_stable_across_calls() {
        let a = socket_url("https://app.postdeck.io", "/ws", "u1").unwrap();
        let b = socket_url("https://app.postdeck.io", "/ws", "u1").unwrap();
        assert_eq!(a, b);
    }
}
