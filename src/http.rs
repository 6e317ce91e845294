// src/http.rs

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::Service;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

const MAX_ERROR_BODY: usize = 200;

pub(crate) fn build_client(config: &Config) -> Result<Client> {
    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .build()?;
    Ok(client)
}

/// Join a base URL and a path without doubling or dropping the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-2xx response into [`Error::Status`].
pub(crate) async fn check_status(service: Service, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!(%service, status = status.as_u16(), body = %body, "request rejected");
    Err(Error::Status {
        service,
        status: status.as_u16(),
        message: error_message(&body).unwrap_or_else(|| {
            status.canonical_reason().unwrap_or("request failed").to_string()
        }),
    })
}

/// Check the status and decode a JSON body. Shape mismatches are [`Error::Decode`].
pub(crate) async fn decode_json<T: DeserializeOwned>(service: Service, resp: Response) -> Result<T> {
    let resp = check_status(service, resp).await?;
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| Error::Decode(format!("{service}: {e}")))
}

/// Pull a readable message out of an error body.
///
/// Understands `{"error": "..."}`, `{"message": "..."}` and
/// `{"errors": [{"detail": "..."}]}`; falls back to the raw text.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let found = value
            .get("error")
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .or_else(|| {
                value
                    .get("errors")?
                    .get(0)
                    .and_then(|e| e.get("detail").or_else(|| e.get("title")))
                    .and_then(Value::as_str)
            });
        if let Some(found) = found {
            return Some(found.to_string());
        }
    }
    Some(body.chars().take(MAX_ERROR_BODY).collect())
}

/// A local HTTP/1.1 server replaying canned responses, for client tests.
#[cfg(test)]
pub(crate) mod canned {
    use reqwest::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// A request as the server received it.
    #[derive(Debug)]
    pub(crate) struct Received {
        /// e.g. `GET /manga/m1/feed?limit=100&offset=0 HTTP/1.1`
        pub line: String,
        pub head: String,
        pub body: String,
    }

    /// Answer one connection per `(status, body)` pair, in order. `{base}` in a
    /// body is replaced with the server's own URL. The handle yields the
    /// requests once every response has been sent.
    pub(crate) async fn serve(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, JoinHandle<Vec<Received>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let server_url = base_url.clone();
        let handle = tokio::spawn(async move {
            let base_url = server_url;
            let mut received = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                received.push(read_request(&mut stream).await);

                let body = body.replace("{base}", &base_url);
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");
                let reply = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
            received
        });
        (base_url, handle)
    }

    async fn read_request(stream: &mut TcpStream) -> Received {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending the body");
            buf.extend_from_slice(&chunk[..n]);
        }

        Received {
            line: head.lines().next().unwrap_or_default().to_string(),
            body: String::from_utf8_lossy(&buf[head_end..head_end + length]).into_owned(),
            head,
        }
    }
}
