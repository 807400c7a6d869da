use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use super::error::TranscriptionError;
use super::multipart::MultipartEncoder;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// POSTs multipart bodies and sorts responses into success, rate limit, or
/// failure.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TranscriptionError> {
        let client = Client::builder()
            .user_agent(concat!("notescribe-rs/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(TranscriptionError::http)?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Sends the encoded form and returns the raw status and body.
    ///
    /// The connection goes back to the pool (or is closed) when the response
    /// is dropped, on every path out of this function.
    pub async fn send(
        &self,
        url: &Url,
        mut headers: HeaderMap,
        form: &MultipartEncoder,
    ) -> Result<TransportResponse, TranscriptionError> {
        let body = form.encode()?;
        debug!(url = %url, bytes = body.len(), "POST multipart request");

        // The form owns the content type; a caller-supplied one is replaced.
        let content_type = HeaderValue::from_str(&form.content_type()).map_err(|err| {
            TranscriptionError::InvalidRequest(format!("invalid multipart content type: {}", err))
        })?;
        headers.insert(CONTENT_TYPE, content_type);

        let response = self
            .client
            .post(url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(TranscriptionError::http)?;

        let status = response.status();
        let body = response.bytes().await.map_err(TranscriptionError::http)?;
        debug!(status = status.as_u16(), bytes = body.len(), "Response received");

        Ok(TransportResponse { status, body })
    }

    /// `send` followed by `classify`.
    pub async fn post(
        &self,
        url: &Url,
        headers: HeaderMap,
        form: &MultipartEncoder,
    ) -> Result<Bytes, TranscriptionError> {
        let response = self.send(url, headers, form).await?;
        classify(response)
    }
}

/// Maps a response onto the error taxonomy: 429 is `RateLimited`, any other
/// status from 400 up is `HttpStatus` carrying the body, anything lower is a
/// success payload.
pub fn classify(response: TransportResponse) -> Result<Bytes, TranscriptionError> {
    let TransportResponse { status, body } = response;

    if status == StatusCode::TOO_MANY_REQUESTS {
        let body = String::from_utf8_lossy(&body).into_owned();
        warn!("Provider rate limited the request: {}", truncate(&body));
        return Err(TranscriptionError::RateLimited { body });
    }

    if status.as_u16() >= 400 {
        let body = String::from_utf8_lossy(&body).into_owned();
        warn!("Provider returned {}: {}", status, truncate(&body));
        return Err(TranscriptionError::status(status, body));
    }

    Ok(body)
}

pub(crate) fn truncate(input: &str) -> String {
    const MAX_LEN: usize = 512;
    if input.len() <= MAX_LEN {
        return input.to_string();
    }
    let mut end = MAX_LEN;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &input[..end])
}
