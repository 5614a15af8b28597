//! Request and response interceptors.
//!
//! # Design
//! Both sides are plain functions over the `http` data types so they can be
//! tested without a transport. `prepare_request` runs before every attempt,
//! including retries; the response side turns whatever the transport
//! produced into either a successful response or a normalized `ApiError`.
//! The only side effect here is clearing the token store on HTTP 401.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::token::TokenStore;
use crate::transport::TransportError;
use crate::types::{Envelope, SUCCESS_CODE};

pub const AUTHORIZATION: &str = "Authorization";
pub const REQUEST_ID: &str = "X-Request-ID";
/// Query parameter carrying the cache-busting timestamp on GET requests.
pub const CACHE_BUSTER: &str = "_t";

pub const NETWORK_ERROR_MESSAGE: &str = "network connection error, check your network settings";
pub const TIMEOUT_MESSAGE: &str = "request timed out, please retry later";
pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error, please retry later";
pub const BUSINESS_ERROR_MESSAGE: &str = "request failed";

/// Message shown for a non-2xx transport status.
pub fn status_message(status: u16) -> &'static str {
    match status {
        401 => "session expired, please log in again",
        403 => "no permission to access this resource",
        404 => "requested resource does not exist",
        500 => "internal server error",
        502 => "bad gateway",
        503 => "service temporarily unavailable",
        _ => UNKNOWN_ERROR_MESSAGE,
    }
}

/// Tracing identifier: `req_<epoch millis>_<9 random chars>`.
pub fn request_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("req_{}_{}", now.timestamp_millis(), &suffix[..9])
}

/// Decorate an outgoing request: cache buster for GET, bearer token when one
/// is stored, and a fresh request id.
pub fn prepare_request(
    mut request: HttpRequest,
    tokens: &dyn TokenStore,
    now: DateTime<Utc>,
) -> HttpRequest {
    if request.method == HttpMethod::Get {
        request.set_query(CACHE_BUSTER, now.timestamp_millis().to_string());
    }

    if let Some(token) = tokens.access_token() {
        request.set_header(AUTHORIZATION, format!("Bearer {token}"));
    }

    let id = request_id(now);
    debug!(
        method = request.method.as_str(),
        url = %request.url,
        request_id = %id,
        "sending request"
    );
    request.set_header(REQUEST_ID, id);
    request
}

/// Check the transport status of a received response.
///
/// 2xx responses pass through untouched. Anything else becomes
/// `HttpStatus`; a 401 also clears the stored tokens.
pub fn interpret_response(
    response: HttpResponse,
    tokens: &dyn TokenStore,
) -> Result<HttpResponse, ApiError> {
    if response.is_success() {
        debug!(status = response.status, "received response");
        return Ok(response);
    }

    let status = response.status;
    if status == 401 {
        if let Err(err) = tokens.clear() {
            warn!(error = %err, "failed to clear tokens after 401");
        }
    }

    warn!(status, "request failed with HTTP status");
    Err(ApiError::HttpStatus {
        status,
        message: status_message(status).to_string(),
        body: response.text(),
    })
}

/// Normalize a failure where no response was received.
pub fn interpret_transport_error(error: TransportError) -> ApiError {
    warn!(error = %error, "transport failure");
    match error {
        TransportError::Timeout(after) => ApiError::Timeout {
            message: TIMEOUT_MESSAGE.to_string(),
            after,
        },
        TransportError::Connect(cause) => ApiError::Network {
            message: NETWORK_ERROR_MESSAGE.to_string(),
            cause,
        },
        TransportError::InvalidRequest(reason) => ApiError::InvalidRequest(reason),
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    success: bool,
}

/// Parse the envelope of a 2xx response and enforce the business code.
pub fn decode_envelope<T: DeserializeOwned>(response: &HttpResponse) -> Result<Envelope<T>, ApiError> {
    let raw: RawEnvelope = serde_json::from_slice(&response.body)
        .map_err(|e| ApiError::Deserialization(format!("invalid response envelope: {e}")))?;

    if raw.code != SUCCESS_CODE {
        let message = if raw.message.is_empty() {
            BUSINESS_ERROR_MESSAGE.to_string()
        } else {
            raw.message
        };
        warn!(code = raw.code, %message, "business error");
        return Err(ApiError::Business {
            code: raw.code,
            message,
        });
    }

    let data = serde_json::from_value(raw.data)
        .map_err(|e| ApiError::Deserialization(e.to_string()))?;
    Ok(Envelope {
        code: raw.code,
        message: raw.message,
        data,
        success: raw.success,
    })
}
