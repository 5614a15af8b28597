//! Multi-service HTTP API client core.
//!
//! # Overview
//! Wraps a transport with a request/response interceptor pair (bearer token,
//! request id, cache-busting timestamp, error normalization), a bounded
//! fixed-delay retry for transient failures, a per-service configuration
//! table, and a registry of typed API modules.
//!
//! # Design
//! - Requests and responses are plain data (`http`); only `transport`
//!   performs network I/O, so the interceptors are pure functions.
//! - `ApiContext` is built explicitly and owns the token store, transport
//!   and module registry; nothing is a process-wide singleton.
//! - Every failure becomes an `ApiError`; `ApiError::kind()` classifies it
//!   even after domain modules attach context labels.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod context;
pub mod crud;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod modules;
pub mod registry;
pub mod token;
pub mod transport;
pub mod types;

pub use client::HttpClient;
pub use config::{RetryPolicy, ServiceConfig, ServiceName, ServiceOverrides, ServicesConfig};
pub use context::{ApiContext, ApiContextBuilder};
pub use crud::Crud;
pub use error::{ApiError, ErrorKind};
pub use http::{
    FileUpload, FormPart, HttpMethod, HttpRequest, HttpResponse, MultipartForm, RequestBody,
    RequestOptions,
};
pub use modules::{ApiModule, FileApi, UserApi};
pub use registry::ModuleRegistry;
pub use token::{FileTokenStore, MemoryTokenStore, TokenKind, TokenPair, TokenStore};
pub use transport::{ReqwestTransport, Transport, TransportError};
pub use types::{Envelope, Paginated, PaginationParams, UploadResponse};
