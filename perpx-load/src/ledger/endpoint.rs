use perpx_load_core::DEFAULT_REST_URL;
use url::Url;

/// Derives the REST (LCD) base URL of a node from the RPC endpoint an operator passes in.
///
/// `ws://127.0.0.1:36657/websocket` becomes `http://localhost:31317`, `http://node:26657`
/// becomes `http://node:1317`. Other `http(s)` URLs are taken to be REST URLs already. Websocket
/// URLs on unknown ports and anything unparsable fall back to the local default.
pub fn rest_url(endpoint: &str) -> String {
    let Ok(mut url) = Url::parse(endpoint.trim()) else {
        return DEFAULT_REST_URL.to_string();
    };

    let (scheme, websocket) = match url.scheme() {
        "http" => ("http", false),
        "https" => ("https", false),
        "ws" => ("http", true),
        "wss" => ("https", true),
        _ => return DEFAULT_REST_URL.to_string(),
    };
    if url.set_scheme(scheme).is_err() {
        return DEFAULT_REST_URL.to_string();
    }

    if url.host_str() == Some("127.0.0.1") && url.set_host(Some("localhost")).is_err() {
        return DEFAULT_REST_URL.to_string();
    }

    let port = match url.port() {
        Some(36657) => Some(31317),
        Some(26657) => Some(1317),
        Some(p @ (31317 | 1317)) => Some(p),
        port if !websocket => port,
        _ => return DEFAULT_REST_URL.to_string(),
    };
    if url.set_port(port).is_err() {
        return DEFAULT_REST_URL.to_string();
    }

    url.set_path("");
    url.set_query(None);
    url.as_str().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_rpc() {
        assert_eq!(
            rest_url("ws://127.0.0.1:36657/websocket"),
            "http://localhost:31317"
        );
        assert_eq!(
            rest_url("wss://node.example:36657/websocket"),
            "https://node.example:31317"
        );
    }

    #[test]
    fn standard_cometbft_port() {
        assert_eq!(rest_url("http://node.example:26657"), "http://node.example:1317");
    }

    #[test]
    fn rest_urls_are_kept() {
        assert_eq!(rest_url("http://localhost:1317/"), "http://localhost:1317");
        assert_eq!(rest_url("https://lcd.example:31317"), "https://lcd.example:31317");
    }

    #[test]
    fn plain_http_is_already_rest() {
        assert_eq!(rest_url("http://127.0.0.1:40123"), "http://localhost:40123");
        assert_eq!(rest_url("https://lcd.example"), "https://lcd.example");
    }

    #[test]
    fn unknown_endpoints_fall_back() {
        assert_eq!(rest_url("ws://node.example:8080/websocket"), DEFAULT_REST_URL);
        assert_eq!(rest_url("not a url"), DEFAULT_REST_URL);
        assert_eq!(rest_url("tcp://localhost:36657"), DEFAULT_REST_URL);
    }
}
