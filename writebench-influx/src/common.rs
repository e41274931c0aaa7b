use writebench_harness::{BackendError, BackendResult};

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("writebench/", env!("CARGO_PKG_VERSION"));

/// Creates a reqwest client with required defaults.
pub(crate) fn reqwest_client() -> BackendResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|cause| BackendError::request("failed to build HTTP client", cause))
}

/// Base URL without trailing slashes, so endpoint paths can be appended directly.
pub(crate) fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}

/// Sends a request, mapping transport failures to [`BackendError::Request`].
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    context: &str,
) -> BackendResult<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|cause| BackendError::request(context, cause))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Rejected {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Extracts the message from an InfluxDB error body.
///
/// 1.x responds with `{"error": "..."}`, 2.x with `{"code": "...", "message": "..."}`. Anything
/// else is passed through as-is.
fn error_message(body: &str) -> String {
    let json = serde_json::from_str::<serde_json::Value>(body).ok();
    json.as_ref()
        .and_then(|value| value.get("message").or_else(|| value.get("error")))
        .and_then(|message| message.as_str())
        .unwrap_or(body.trim())
        .to_owned()
}

/// Escapes a string for use inside a double-quoted InfluxQL identifier.
pub(crate) fn escape_quoted(value: &str) -> String {
    escape_chars(value, &['"', '\\'])
}

/// Escapes a string for use inside a Flux string literal, where `${` starts an interpolation.
pub(crate) fn escape_flux(value: &str) -> String {
    escape_chars(value, &['"', '\\', '$'])
}

fn escape_chars(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_formats() {
        assert_eq!(error_message(r#"{"error":"database not found"}"#), "database not found");
        assert_eq!(
            error_message(r#"{"code":"unauthorized","message":"unauthorized access"}"#),
            "unauthorized access"
        );
        assert_eq!(error_message("bad gateway\n"), "bad gateway");
    }

    #[test]
    fn escapes_quotes() {
        assert_eq!(escape_quoted(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_quoted("sensor_1"), "sensor_1");
        assert_eq!(escape_quoted("cost$"), "cost$");
    }

    #[test]
    fn escapes_flux_interpolation() {
        assert_eq!(escape_flux(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_flux("${env}"), r"\${env}");
    }

    #[test]
    fn strips_trailing_slash() {
        assert_eq!(base_url("http://localhost:8086/"), "http://localhost:8086");
    }
}
