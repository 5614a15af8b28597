//! Per-service HTTP client with interception and retry.
//!
//! # Design
//! `HttpClient` is bound to one service configuration and is cheap to clone:
//! the transport and token store are shared `Arc`s. Every call goes through
//! the same pipeline:
//!
//! `prepare_request` → `Transport::execute` → `interpret_response` /
//! `interpret_transport_error` → (retry) → `decode_envelope`.
//!
//! The retry counter lives on the stack of each call, so concurrent calls on
//! one client never share a retry budget.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{RetryPolicy, ServiceConfig, ServiceName};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, MultipartForm, RequestOptions};
use crate::interceptor;
use crate::token::TokenStore;
use crate::transport::Transport;
use crate::types::Envelope;

const DEFAULT_DOWNLOAD_NAME: &str = "download";

/// Client bound to a single backend service.
#[derive(Clone)]
pub struct HttpClient {
    service: ServiceName,
    config: Arc<ServiceConfig>,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    retry: RetryPolicy,
    download_dir: PathBuf,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("service", &self.service)
            .field("base_url", &self.config.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new(
        service: ServiceName,
        config: ServiceConfig,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            service,
            config: Arc::new(config),
            transport,
            tokens,
            retry: RetryPolicy::default(),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_NAME),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn service(&self) -> ServiceName {
        self.service
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Send a request and decode its envelope.
    pub async fn request<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
    ) -> Result<Envelope<T>, ApiError> {
        let options = request.options;
        let url = request.url.clone();
        if options.show_loading {
            info!(service = %self.service, %url, "loading started");
        }

        let result = match self.dispatch(request).await {
            Ok(response) => interceptor::decode_envelope(&response),
            Err(err) => Err(err),
        };

        if options.show_loading {
            info!(service = %self.service, %url, "loading finished");
        }
        if let Err(err) = &result {
            report_failure(&options, self.service, &url, err);
        }
        result
    }

    pub async fn get<T, Q>(&self, path: &str, query: &Q) -> Result<Envelope<T>, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.request(HttpRequest::get(path).query(query)?).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<Envelope<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpRequest::post(path).json(body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<Envelope<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpRequest::put(path).json(body)?).await
    }

    pub async fn delete<T, Q>(&self, path: &str, query: &Q) -> Result<Envelope<T>, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.request(HttpRequest::delete(path).query(query)?).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<Envelope<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpRequest::patch(path).json(body)?).await
    }

    /// POST a multipart form. A bare `FileUpload` is sent as the `file` part.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        form: impl Into<MultipartForm>,
    ) -> Result<Envelope<T>, ApiError> {
        let request = HttpRequest::post(path)
            .multipart(form.into())
            .header("Content-Type", "multipart/form-data");
        self.request(request).await
    }

    /// Fetch a binary payload and save it in the download directory.
    ///
    /// Only the file name component of `filename` is used; without one the
    /// file is saved as `download`.
    pub async fn download<Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
        filename: Option<&str>,
    ) -> Result<(), ApiError> {
        let request = HttpRequest::get(path).query(query)?;
        let options = request.options;
        let url = request.url.clone();

        let response = match self.dispatch(request).await {
            Ok(response) => response,
            Err(err) => {
                report_failure(&options, self.service, &url, &err);
                return Err(err);
            }
        };

        let target = self.download_dir.join(safe_file_name(filename));
        tokio::fs::create_dir_all(&self.download_dir).await?;
        tokio::fs::write(&target, &response.body).await?;
        info!(
            service = %self.service,
            path = %target.display(),
            bytes = response.body.len(),
            "download saved"
        );
        Ok(())
    }

    /// Run one logical request through the interceptors with retry.
    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let request = self.resolve(request);
        let timeout = request.options.timeout.unwrap_or(self.config.timeout);
        let mut retries: u32 = 0;

        loop {
            let prepared =
                interceptor::prepare_request(request.clone(), self.tokens.as_ref(), Utc::now());
            let outcome = match self.transport.execute(&prepared, timeout).await {
                Ok(response) => interceptor::interpret_response(response, self.tokens.as_ref()),
                Err(err) => Err(interceptor::interpret_transport_error(err)),
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() => {
                    if retries >= self.retry.max_retries {
                        return Err(ApiError::RetryExhausted {
                            attempts: retries + 1,
                            last: Box::new(err),
                        });
                    }
                    retries += 1;
                    warn!(
                        service = %self.service,
                        url = %request.url,
                        attempt = retries,
                        max = self.retry.max_retries,
                        error = %err,
                        "retrying request"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Resolve the URL against the base address and apply default headers.
    fn resolve(&self, mut request: HttpRequest) -> HttpRequest {
        if !is_absolute(&request.url) {
            let path = request.url.trim_start_matches('/');
            request.url = format!("{}/{}", self.config.base_url, path);
        }

        let mut headers = self.config.headers.clone();
        for (name, value) in request.headers.drain(..) {
            match headers
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
            {
                Some(slot) => slot.1 = value,
                None => headers.push((name, value)),
            }
        }
        request.headers = headers;
        request
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn safe_file_name(filename: Option<&str>) -> PathBuf {
    filename
        .and_then(|name| Path::new(name).file_name())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_NAME))
}

fn report_failure(options: &RequestOptions, service: ServiceName, url: &str, err: &ApiError) {
    if options.show_error {
        warn!(%service, %url, error = %err, "request failed");
    } else {
        debug!(%service, %url, error = %err, "request failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::token::MemoryTokenStore;
    use crate::transport::TransportError;

    /// Records requests and answers every one with the same envelope.
    #[derive(Default)]
    struct EchoTransport {
        seen: Mutex<Vec<(HttpRequest, Duration)>>,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn execute(
            &self,
            request: &HttpRequest,
            timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push((request.clone(), timeout));
            Ok(HttpResponse::new(200, r#"{"code":200,"message":"ok","data":null}"#))
        }
    }

    fn client(transport: Arc<EchoTransport>) -> HttpClient {
        let config = ServiceConfig::new("http://api.test/user-api/")
            .with_timeout(Duration::from_secs(15))
            .with_header("Content-Type", "application/json;charset=UTF-8");
        HttpClient::new(
            ServiceName::User,
            config,
            transport,
            Arc::new(MemoryTokenStore::new()),
        )
    }

    #[tokio::test]
    async fn paths_are_joined_onto_the_base_url() {
        let transport = Arc::new(EchoTransport::default());
        let http = client(transport.clone());

        http.get::<(), _>("/user/profile", &()).await.unwrap();
        http.get::<(), _>("admin/users", &()).await.unwrap();
        http.get::<(), _>("https://cdn.test/x", &()).await.unwrap();

        let urls: Vec<String> = transport
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|(req, _)| req.url.clone())
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://api.test/user-api/user/profile",
                "http://api.test/user-api/admin/users",
                "https://cdn.test/x",
            ]
        );
    }

    #[tokio::test]
    async fn upload_forces_multipart_content_type() {
        let transport = Arc::new(EchoTransport::default());
        let http = client(transport.clone());

        let file = crate::http::FileUpload::new("a.txt", b"abc".to_vec());
        http.upload::<()>("/user/avatar", file).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        let (req, _) = &seen[0];
        assert_eq!(req.headers.len(), 2, "content type and request id: {req:?}");
        assert_eq!(req.header_value("content-type"), Some("multipart/form-data"));
        assert!(matches!(req.body, crate::http::RequestBody::Multipart(_)));
    }

    #[tokio::test]
    async fn timeout_option_overrides_service_timeout() {
        let transport = Arc::new(EchoTransport::default());
        let http = client(transport.clone());

        http.get::<(), _>("/a", &()).await.unwrap();
        let options = RequestOptions {
            timeout: Some(Duration::from_millis(250)),
            ..RequestOptions::default()
        };
        http.request::<()>(HttpRequest::get("/b").options(options))
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].1, Duration::from_secs(15));
        assert_eq!(seen[1].1, Duration::from_millis(250));
    }

    #[test]
    fn download_names_are_reduced_to_a_file_name() {
        assert_eq!(safe_file_name(None), PathBuf::from("download"));
        assert_eq!(safe_file_name(Some("../../etc/passwd")), PathBuf::from("passwd"));
        assert_eq!(safe_file_name(Some("report.pdf")), PathBuf::from("report.pdf"));
        assert_eq!(safe_file_name(Some("..")), PathBuf::from("download"));
    }
}
