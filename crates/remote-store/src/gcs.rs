use crate::{ObjectSink, RemoteError, RemoteRef, RemoteStore};
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use std::env;
use std::io::{self, Read, Write};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Google Cloud Storage over the JSON API.
///
/// Credentials are a bearer token taken from `GOOGLE_OAUTH_ACCESS_TOKEN`; without
/// one, requests go out anonymously and only public buckets are reachable.
/// `STORAGE_EMULATOR_HOST` redirects every request to a local emulator.
#[derive(Debug, Clone)]
pub struct GcsStore {
    client: Client,
    endpoint: String,
    token: Option<String>,
    max_retries: u32,
}

impl GcsStore {
    pub fn new(endpoint: Option<String>, token: Option<String>) -> Result<Self, RemoteError> {
        let endpoint = endpoint
            .or_else(|| env::var("STORAGE_EMULATOR_HOST").ok())
            .filter(|e| !e.trim().is_empty())
            .map(|e| {
                if e.starts_with("http://") || e.starts_with("https://") {
                    e
                } else {
                    format!("http://{}", e)
                }
            })
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let token = token
            .or_else(|| env::var("GOOGLE_OAUTH_ACCESS_TOKEN").ok())
            .filter(|t| !t.trim().is_empty());
        if token.is_none() {
            warn!("GOOGLE_OAUTH_ACCESS_TOKEN is not set; GCS requests will be anonymous");
        }

        let max_retries = env::var("SHEPHERD_GCS_RETRY_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(3)
            .max(1);

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| RemoteError::Client {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            max_retries,
        })
    }

    pub fn from_env() -> Result<Self, RemoteError> {
        Self::new(None, None)
    }

    fn base_url(&self, reference: &RemoteRef, segments: &[&str]) -> Result<Url, RemoteError> {
        let invalid = |message: String| RemoteError::Request {
            reference: reference.to_string(),
            message,
        };

        if reference.key().is_empty() {
            return Err(invalid("reference has no object key".to_string()));
        }

        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| invalid(format!("invalid GCS endpoint {}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("GCS endpoint {} cannot carry a path", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn media_url(&self, reference: &RemoteRef) -> Result<Url, RemoteError> {
        let mut url = self.base_url(
            reference,
            &["storage", "v1", "b", reference.bucket(), "o", reference.key()],
        )?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn upload_url(&self, reference: &RemoteRef) -> Result<Url, RemoteError> {
        let mut url = self.base_url(
            reference,
            &["upload", "storage", "v1", "b", reference.bucket(), "o"],
        )?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", reference.key());
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends the request built by `build`, retrying connection failures,
    /// timeouts and 5xx responses with exponential backoff.
    fn send_with_retry<F>(&self, reference: &RemoteRef, mut build: F) -> Result<Response, RemoteError>
    where
        F: FnMut() -> Result<RequestBuilder, RemoteError>,
    {
        let mut last_error = None;
        let mut backoff_ms = 100;

        for attempt in 0..self.max_retries {
            match build()?.send() {
                Ok(response) if response.status().is_server_error() => {
                    last_error = Some(status_error(reference, response));
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(RemoteError::Request {
                        reference: reference.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(RemoteError::Request {
                        reference: reference.to_string(),
                        message: e.to_string(),
                    })
                }
            }

            if attempt + 1 < self.max_retries {
                debug!(
                    %reference,
                    "GCS attempt {} failed, retrying in {}ms",
                    attempt + 1,
                    backoff_ms
                );
                std::thread::sleep(Duration::from_millis(backoff_ms));
                backoff_ms *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| RemoteError::Request {
            reference: reference.to_string(),
            message: "All retry attempts exhausted".to_string(),
        }))
    }
}

fn status_error(reference: &RemoteRef, response: Response) -> RemoteError {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    let body = body.trim();
    let message = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body.chars().take(512).collect::<String>())
    };
    RemoteError::Request {
        reference: reference.to_string(),
        message,
    }
}

impl RemoteStore for GcsStore {
    fn open_read(&self, reference: &RemoteRef) -> Result<Box<dyn Read + Send>, RemoteError> {
        let url = self.media_url(reference)?;
        debug!(%reference, "downloading GCS object");
        let response =
            self.send_with_retry(reference, || Ok(self.authorize(self.client.get(url.clone()))))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound {
                reference: reference.to_string(),
            }),
            status if status.is_success() => Ok(Box::new(response)),
            _ => Err(status_error(reference, response)),
        }
    }

    fn open_write(&self, reference: &RemoteRef) -> Result<Box<dyn ObjectSink>, RemoteError> {
        // Fail on a bad reference before the caller streams anything.
        self.upload_url(reference)?;
        let spool = NamedTempFile::new().map_err(|err| RemoteError::io(reference, err))?;
        Ok(Box::new(GcsUpload {
            store: self.clone(),
            reference: reference.clone(),
            spool,
        }))
    }
}

/// Spools the object to a temporary file and uploads it in one request on finish.
struct GcsUpload {
    store: GcsStore,
    reference: RemoteRef,
    spool: NamedTempFile,
}

impl Write for GcsUpload {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.spool.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.spool.flush()
    }
}

impl ObjectSink for GcsUpload {
    fn finish(self: Box<Self>) -> Result<(), RemoteError> {
        let GcsUpload {
            store,
            reference,
            mut spool,
        } = *self;
        spool
            .flush()
            .map_err(|err| RemoteError::io(&reference, err))?;
        let len = spool
            .as_file()
            .metadata()
            .map_err(|err| RemoteError::io(&reference, err))?
            .len();
        let url = store.upload_url(&reference)?;

        debug!(%reference, bytes = len, "uploading GCS object");
        let response = store.send_with_retry(&reference, || {
            let file = spool
                .reopen()
                .map_err(|err| RemoteError::io(&reference, err))?;
            Ok(store
                .authorize(store.client.post(url.clone()))
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(Body::sized(file, len)))
        })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(&reference, response))
        }
    }
}
