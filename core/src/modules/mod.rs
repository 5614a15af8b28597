//! Domain API modules.
//!
//! A module composes an [`HttpClient`] bound to its service and exposes one
//! method per remote operation. Failures are logged and labeled with the
//! operation name, then propagated unchanged in kind.

pub mod file;
pub mod user;

use std::future::Future;

use tracing::error;

use crate::client::HttpClient;
use crate::config::ServiceName;
use crate::error::ApiError;
use crate::types::Envelope;

pub use file::FileApi;
pub use user::UserApi;

/// A set of typed operations over one service.
pub trait ApiModule: Send + Sync + Sized + 'static {
    /// Registry name used by `ApiContext::init_modules`.
    const NAME: &'static str;
    /// Service the module binds to by default.
    const SERVICE: ServiceName;

    fn from_client(http: HttpClient) -> Self;

    fn http(&self) -> &HttpClient;
}

/// Await one request, unwrap its payload, and label any failure.
pub(crate) async fn labeled<T>(
    module: &'static str,
    context: &'static str,
    call: impl Future<Output = Result<Envelope<T>, ApiError>>,
) -> Result<T, ApiError> {
    match call.await {
        Ok(envelope) => Ok(envelope.data),
        Err(err) => Err(label(module, context, err)),
    }
}

pub(crate) fn label(module: &'static str, context: &'static str, err: ApiError) -> ApiError {
    error!(module, "{context}: {err}");
    err.with_context(context)
}
