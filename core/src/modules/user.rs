//! Authentication, profile and user administration endpoints.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::HttpClient;
use crate::config::ServiceName;
use crate::error::ApiError;
use crate::http::FileUpload;
use crate::modules::{label, labeled, ApiModule};
use crate::token::TokenPair;
use crate::types::{Paginated, PaginationParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Banned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub status: UserStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginParams {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha: Option<String>,
}

/// Phone + one-time code login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsLoginParams {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub user: User,
    pub expires_in: u64,
}

impl LoginResponse {
    pub fn token_pair(&self) -> TokenPair {
        TokenPair {
            access_token: self.token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParams {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub captcha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordParams {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordParams {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

/// Filters for the admin user list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserListQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarResponse {
    pub url: String,
}

/// User service operations.
///
/// Successful logins and refreshes store the returned token pair; logout
/// clears it.
#[derive(Debug, Clone)]
pub struct UserApi {
    http: HttpClient,
}

impl ApiModule for UserApi {
    const NAME: &'static str = "user";
    const SERVICE: ServiceName = ServiceName::User;

    fn from_client(http: HttpClient) -> Self {
        Self { http }
    }

    fn http(&self) -> &HttpClient {
        &self.http
    }
}

impl UserApi {
    pub async fn login(&self, params: &LoginParams) -> Result<LoginResponse, ApiError> {
        let response: LoginResponse =
            labeled(Self::NAME, "user login", self.http.post("/auth/login", params)).await?;
        self.store_session(&response, "user login")?;
        Ok(response)
    }

    pub async fn login_sms(&self, params: &SmsLoginParams) -> Result<LoginResponse, ApiError> {
        let response: LoginResponse =
            labeled(Self::NAME, "sms login", self.http.post("/login/sms", params)).await?;
        self.store_session(&response, "sms login")?;
        Ok(response)
    }

    pub async fn register(&self, params: &RegisterParams) -> Result<User, ApiError> {
        labeled(Self::NAME, "user registration", self.http.post("/auth/register", params)).await
    }

    /// Tokens are cleared whether or not the server call succeeds.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = labeled(Self::NAME, "logout", self.http.post("/auth/logout", &())).await;
        self.http
            .tokens()
            .clear()
            .map_err(|e| label(Self::NAME, "logout", e))?;
        result
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<LoginResponse, ApiError> {
        let response: LoginResponse = labeled(
            Self::NAME,
            "refresh token",
            self.http
                .post("/auth/refresh", &json!({ "refreshToken": refresh_token })),
        )
        .await?;
        self.store_session(&response, "refresh token")?;
        Ok(response)
    }

    pub async fn get_current_user(&self) -> Result<User, ApiError> {
        labeled(Self::NAME, "get user profile", self.http.get("/user/profile", &())).await
    }

    pub async fn update_profile(&self, params: &UpdateUserParams) -> Result<User, ApiError> {
        labeled(Self::NAME, "update user profile", self.http.put("/user/profile", params)).await
    }

    pub async fn change_password(&self, params: &ChangePasswordParams) -> Result<(), ApiError> {
        labeled(Self::NAME, "change password", self.http.put("/user/password", params)).await
    }

    pub async fn reset_password(&self, params: &ResetPasswordParams) -> Result<(), ApiError> {
        labeled(
            Self::NAME,
            "reset password",
            self.http.post("/auth/reset-password", params),
        )
        .await
    }

    pub async fn send_verification_code(&self, email: &str) -> Result<(), ApiError> {
        labeled(
            Self::NAME,
            "send verification code",
            self.http.post("/auth/send-code", &json!({ "email": email })),
        )
        .await
    }

    pub async fn upload_avatar(&self, file: FileUpload) -> Result<AvatarResponse, ApiError> {
        labeled(Self::NAME, "upload avatar", self.http.upload("/user/avatar", file)).await
    }

    pub async fn get_user_list(&self, query: &UserListQuery) -> Result<Paginated<User>, ApiError> {
        labeled(Self::NAME, "get user list", self.http.get("/admin/users", query)).await
    }

    pub async fn get_user_detail(&self, user_id: &str) -> Result<User, ApiError> {
        labeled(
            Self::NAME,
            "get user detail",
            self.http.get(&format!("/admin/users/{user_id}"), &()),
        )
        .await
    }

    pub async fn update_user_status(&self, user_id: &str, status: UserStatus) -> Result<(), ApiError> {
        labeled(
            Self::NAME,
            "update user status",
            self.http.put(
                &format!("/admin/users/{user_id}/status"),
                &json!({ "status": status }),
            ),
        )
        .await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), ApiError> {
        labeled(
            Self::NAME,
            "delete user",
            self.http.delete(&format!("/admin/users/{user_id}"), &()),
        )
        .await
    }

    fn store_session(&self, response: &LoginResponse, context: &'static str) -> Result<(), ApiError> {
        self.http
            .tokens()
            .set_pair(&response.token_pair())
            .map_err(|e| label(Self::NAME, context, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_list_query_flattens_pagination() {
        let query = UserListQuery {
            pagination: PaginationParams { page: 2, page_size: 10 },
            keyword: None,
            status: Some(UserStatus::Banned),
        };
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["page"], 2);
        assert_eq!(value["pageSize"], 10);
        assert_eq!(value["status"], "banned");
        assert!(value.get("keyword").is_none());
    }

    #[test]
    fn login_response_uses_camel_case() {
        let response: LoginResponse = serde_json::from_value(serde_json::json!({
            "token": "t1",
            "refreshToken": "r1",
            "expiresIn": 3600,
            "user": {
                "id": "u1",
                "username": "a",
                "email": "a@example.com",
                "status": "active",
                "createdAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-01T00:00:00Z"
            }
        }))
        .unwrap();
        assert_eq!(
            response.token_pair(),
            TokenPair {
                access_token: "t1".to_string(),
                refresh_token: "r1".to_string()
            }
        );
        assert_eq!(response.user.status, UserStatus::Active);
        assert!(response.user.phone.is_none());
    }
}
