//! Explicitly constructed client context.
//!
//! # Design
//! `ApiContext` owns everything that would otherwise be process-wide state:
//! the service table, the token store, the transport, and the module
//! registry. Components receive clients built from it, and tests build a
//! fresh context (or `reset` one) instead of sharing globals. Built-in
//! modules are registered eagerly by `init_modules`, in a fixed order.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::client::HttpClient;
use crate::config::{RetryPolicy, ServiceName, ServiceOverrides, ServicesConfig};
use crate::crud::Crud;
use crate::error::ApiError;
use crate::modules::{ApiModule, FileApi, UserApi};
use crate::registry::ModuleRegistry;
use crate::token::{MemoryTokenStore, TokenStore};
use crate::transport::{ReqwestTransport, Transport};

pub struct ApiContext {
    services: ServicesConfig,
    retry: RetryPolicy,
    tokens: Arc<dyn TokenStore>,
    transport: Arc<dyn Transport>,
    download_dir: PathBuf,
    registry: ModuleRegistry,
}

impl std::fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiContext")
            .field("services", &self.services)
            .field("retry", &self.retry)
            .field("download_dir", &self.download_dir)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ApiContext {
    pub fn builder() -> ApiContextBuilder {
        ApiContextBuilder::default()
    }

    /// A client bound to `service`.
    ///
    /// # Errors
    /// `ServiceConfigMissing` if the service has no configuration.
    pub fn client(&self, service: ServiceName) -> Result<HttpClient, ApiError> {
        self.client_with(service, ServiceOverrides::default())
    }

    /// A client bound to `service` with per-client adjustments.
    pub fn client_with(
        &self,
        service: ServiceName,
        overrides: ServiceOverrides,
    ) -> Result<HttpClient, ApiError> {
        let config = overrides.apply(self.services.get(service)?.clone());
        Ok(HttpClient::new(
            service,
            config,
            self.transport.clone(),
            self.tokens.clone(),
        )
        .with_retry(self.retry)
        .with_download_dir(self.download_dir.clone()))
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn services(&self) -> &ServicesConfig {
        &self.services
    }

    /// Build `M` over a client for `service` and register it as `name`,
    /// replacing any existing entry.
    pub fn register<M: ApiModule>(&self, name: &str, service: ServiceName) -> Result<Arc<M>, ApiError> {
        let module = M::from_client(self.client(service)?);
        Ok(self.registry.insert(name, module))
    }

    /// Look up a registered module.
    pub fn module<M: ApiModule>(&self, name: &str) -> Result<Arc<M>, ApiError> {
        self.registry.get(name)
    }

    /// Register the built-in modules (`user`, then `file`) under their
    /// default names. Names that are already taken are left alone.
    pub fn init_modules(&self) -> Result<(), ApiError> {
        self.register_default::<UserApi>()?;
        self.register_default::<FileApi>()?;
        info!(modules = ?self.registry.list(), "API modules initialized");
        Ok(())
    }

    pub fn user(&self) -> Result<Arc<UserApi>, ApiError> {
        self.module(UserApi::NAME)
    }

    pub fn file(&self) -> Result<Arc<FileApi>, ApiError> {
        self.module(FileApi::NAME)
    }

    /// CRUD helper over the main service.
    pub fn crud(&self) -> Result<Crud, ApiError> {
        Ok(Crud::new(self.client(ServiceName::Main)?))
    }

    /// Drop every registered module and stored token.
    pub fn reset(&self) -> Result<(), ApiError> {
        self.registry.clear();
        self.tokens.clear()
    }

    fn register_default<M: ApiModule>(&self) -> Result<(), ApiError> {
        if !self.registry.has(M::NAME) {
            self.register::<M>(M::NAME, M::SERVICE)?;
        }
        Ok(())
    }
}

/// Builder for [`ApiContext`].
pub struct ApiContextBuilder {
    services: ServicesConfig,
    retry: RetryPolicy,
    tokens: Option<Arc<dyn TokenStore>>,
    transport: Option<Arc<dyn Transport>>,
    download_dir: PathBuf,
}

impl Default for ApiContextBuilder {
    fn default() -> Self {
        Self {
            services: ServicesConfig::default(),
            retry: RetryPolicy::default(),
            tokens: None,
            transport: None,
            download_dir: PathBuf::from("downloads"),
        }
    }
}

impl ApiContextBuilder {
    pub fn services(mut self, services: ServicesConfig) -> Self {
        self.services = services;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn tokens(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Services and retry policy from the environment, see [`crate::config`].
    pub fn from_env(mut self) -> Result<Self, ApiError> {
        self.services = ServicesConfig::from_env()?;
        self.retry = RetryPolicy::from_env()?;
        Ok(self)
    }

    /// Finish the context. Without an explicit transport a `reqwest` client
    /// is created; without a token store an in-memory one is used.
    pub fn build(self) -> Result<ApiContext, ApiError> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::new().map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
            ),
        };
        let tokens: Arc<dyn TokenStore> = match self.tokens {
            Some(tokens) => tokens,
            None => Arc::new(MemoryTokenStore::new()),
        };

        Ok(ApiContext {
            services: self.services,
            retry: self.retry,
            tokens,
            transport,
            download_dir: self.download_dir,
            registry: ModuleRegistry::new(),
        })
    }
}
