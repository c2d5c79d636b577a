//! Plumbing shared by the HTTP-based AWS clients.

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use std::time::Duration;
use url::Url;

/// Request timeout; comfortably above the longest long-poll wait
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_http_client() -> Result<HttpClient, reqwest::Error> {
    HttpClient::builder().timeout(REQUEST_TIMEOUT).build()
}

/// Parse and check an endpoint, returning it with the Host header value
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<(Url, String), String> {
    let url = Url::parse(endpoint).map_err(|e| format!("invalid endpoint '{}': {}", endpoint, e))?;
    let host = url
        .host_str()
        .ok_or_else(|| format!("endpoint '{}' has no host", endpoint))?;
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Ok((url, host))
}

/// `Code` and `Message` of an AWS XML error document
///
/// Handles both the SQS shape (`<ErrorResponse><Error>..`) and the S3 shape
/// (`<Error>..` at the root).
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl ErrorBody {
    pub(crate) fn parse(xml: &str) -> Self {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut body = Self::default();
        let mut in_error = false;
        let mut in_code = false;
        let mut in_message = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"Error" => in_error = true,
                    b"Code" if in_error => in_code = true,
                    b"Message" if in_error => in_message = true,
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if in_code {
                        body.code = e.unescape().ok().map(|s| s.into_owned());
                        in_code = false;
                    } else if in_message {
                        body.message = e.unescape().ok().map(|s| s.into_owned());
                        in_message = false;
                    }
                }
                Ok(Event::End(ref e)) if e.name().as_ref() == b"Error" => {
                    in_error = false;
                }
                Ok(Event::Eof) | Err(_) => break,
                _ => {}
            }
            buf.clear();
        }

        body
    }

    pub(crate) fn code_or_unknown(&self) -> String {
        self.code.clone().unwrap_or_else(|| "Unknown".to_string())
    }

    pub(crate) fn message_or_unknown(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
