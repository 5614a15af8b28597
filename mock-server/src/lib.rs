use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

pub const SUCCESS: i64 = 200;
pub const INVALID_CREDENTIALS: i64 = 1001;
pub const INVALID_REFRESH_TOKEN: i64 = 1002;
pub const USERNAME_TAKEN: i64 = 1003;
pub const TOKEN_TTL_SECS: u64 = 3600;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    pub message: String,
    pub data: T,
    pub success: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub user: User,
    pub expires_in: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub url: String,
    pub uploaded_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub list: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub password: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshInput {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileInput {
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

struct Account {
    password: String,
    user: User,
}

struct StoredFile {
    info: FileInfo,
    bytes: Vec<u8>,
}

#[derive(Default)]
pub struct Store {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    files: HashMap<String, StoredFile>,
    unstable_hits: HashMap<String, u32>,
}

pub type Db = Arc<RwLock<Store>>;

/// Failure reply: either a bare HTTP status or a 200 envelope with a
/// business code.
#[derive(Debug)]
pub enum Failure {
    Status(StatusCode),
    Business(i64, String),
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        match self {
            Failure::Status(status) => status.into_response(),
            Failure::Business(code, message) => Json(Envelope {
                code,
                message,
                data: Value::Null,
                success: false,
            })
            .into_response(),
        }
    }
}

type Reply<T> = Result<Json<Envelope<T>>, Failure>;

fn ok<T>(data: T) -> Reply<T> {
    Ok(Json(Envelope {
        code: SUCCESS,
        message: "ok".to_string(),
        data,
        success: true,
    }))
}

const TIMESTAMP: &str = "2024-01-01T00:00:00Z";

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/user/profile", get(profile).put(update_profile))
        .route("/upload", post(upload))
        .route("/files", get(list_files))
        .route("/files/{id}", get(get_file).delete(delete_file))
        .route("/files/{id}/download", get(download_file))
        .route("/unstable/{key}", get(unstable))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the session user, or 401.
fn authorize(store: &Store, headers: &HeaderMap) -> Result<String, Failure> {
    bearer(headers)
        .and_then(|token| store.sessions.get(token))
        .cloned()
        .ok_or(Failure::Status(StatusCode::UNAUTHORIZED))
}

fn open_session(store: &mut Store, username: &str) -> Result<LoginResponse, Failure> {
    let user = store
        .accounts
        .get(username)
        .map(|account| account.user.clone())
        .ok_or(Failure::Status(StatusCode::UNAUTHORIZED))?;
    let token = format!("tok_{}", Uuid::new_v4().simple());
    let refresh_token = format!("ref_{}", Uuid::new_v4().simple());
    store.sessions.insert(token.clone(), username.to_string());
    store
        .refresh_tokens
        .insert(refresh_token.clone(), username.to_string());
    Ok(LoginResponse {
        token,
        refresh_token,
        user,
        expires_in: TOKEN_TTL_SECS,
    })
}

async fn register(State(db): State<Db>, Json(input): Json<RegisterInput>) -> Reply<User> {
    let mut store = db.write().await;
    if store.accounts.contains_key(&input.username) {
        return Err(Failure::Business(USERNAME_TAKEN, "username already taken".to_string()));
    }
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: input.username.clone(),
        email: input.email,
        phone: input.phone,
        avatar: None,
        nickname: None,
        status: "active".to_string(),
        created_at: TIMESTAMP.to_string(),
        updated_at: TIMESTAMP.to_string(),
    };
    store.accounts.insert(
        input.username,
        Account {
            password: input.password,
            user: user.clone(),
        },
    );
    ok(user)
}

async fn login(State(db): State<Db>, Json(input): Json<LoginInput>) -> Reply<LoginResponse> {
    let mut store = db.write().await;
    let valid = store
        .accounts
        .get(&input.username)
        .is_some_and(|account| account.password == input.password);
    if !valid {
        debug!(username = %input.username, "rejected login");
        return Err(Failure::Business(
            INVALID_CREDENTIALS,
            "invalid username or password".to_string(),
        ));
    }
    ok(open_session(&mut store, &input.username)?)
}

async fn refresh(State(db): State<Db>, Json(input): Json<RefreshInput>) -> Reply<LoginResponse> {
    let mut store = db.write().await;
    let Some(username) = store.refresh_tokens.remove(&input.refresh_token) else {
        return Err(Failure::Business(
            INVALID_REFRESH_TOKEN,
            "invalid refresh token".to_string(),
        ));
    };
    store.sessions.retain(|_, owner| *owner != username);
    ok(open_session(&mut store, &username)?)
}

async fn logout(State(db): State<Db>, headers: HeaderMap) -> Reply<Value> {
    let mut store = db.write().await;
    authorize(&store, &headers)?;
    if let Some(token) = bearer(&headers) {
        store.sessions.remove(token);
    }
    ok(Value::Null)
}

async fn profile(State(db): State<Db>, headers: HeaderMap) -> Reply<User> {
    let store = db.read().await;
    let username = authorize(&store, &headers)?;
    let account = store
        .accounts
        .get(&username)
        .ok_or(Failure::Status(StatusCode::NOT_FOUND))?;
    ok(account.user.clone())
}

async fn update_profile(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<UpdateProfileInput>,
) -> Reply<User> {
    let mut store = db.write().await;
    let username = authorize(&store, &headers)?;
    let account = store
        .accounts
        .get_mut(&username)
        .ok_or(Failure::Status(StatusCode::NOT_FOUND))?;
    let user = &mut account.user;
    if let Some(nickname) = input.nickname {
        user.nickname = Some(nickname);
    }
    if let Some(email) = input.email {
        user.email = email;
    }
    if let Some(phone) = input.phone {
        user.phone = Some(phone);
    }
    if let Some(avatar) = input.avatar {
        user.avatar = Some(avatar);
    }
    ok(user.clone())
}

async fn upload(State(db): State<Db>, mut multipart: Multipart) -> Reply<UploadResponse> {
    let mut upload: Option<(String, String, Vec<u8>)> = None;
    let mut fields: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| Failure::Status(StatusCode::BAD_REQUEST))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|_| Failure::Status(StatusCode::BAD_REQUEST))?;
        match file_name {
            Some(file_name) if name == "file" => upload = Some((file_name, mime, bytes.to_vec())),
            _ => {
                fields.insert(name, String::from_utf8_lossy(&bytes).into_owned());
            }
        }
    }

    let (original_name, mime_type, bytes) =
        upload.ok_or(Failure::Status(StatusCode::BAD_REQUEST))?;
    let id = Uuid::new_v4().to_string();
    let filename = match fields.get("folder") {
        Some(folder) => format!("{folder}/{original_name}"),
        None => original_name.clone(),
    };
    let info = FileInfo {
        id: id.clone(),
        filename: filename.clone(),
        original_name,
        size: bytes.len() as u64,
        mime_type,
        url: format!("/files/{id}/download"),
        uploaded_by: "anonymous".to_string(),
        created_at: TIMESTAMP.to_string(),
        updated_at: TIMESTAMP.to_string(),
    };
    let response = UploadResponse {
        url: info.url.clone(),
        filename,
        size: info.size,
    };
    db.write().await.files.insert(id, StoredFile { info, bytes });
    ok(response)
}

async fn list_files(State(db): State<Db>, Query(query): Query<ListQuery>) -> Reply<Page<FileInfo>> {
    let store = db.read().await;
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).max(1);
    let mut all: Vec<FileInfo> = store.files.values().map(|f| f.info.clone()).collect();
    all.sort_by(|a, b| a.filename.cmp(&b.filename));
    let total = all.len() as u64;
    let offset = u64::from(page - 1) * u64::from(page_size);
    let list = all
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(page_size as usize)
        .collect();
    ok(Page {
        list,
        total,
        page,
        page_size,
    })
}

async fn get_file(State(db): State<Db>, Path(id): Path<String>) -> Reply<FileInfo> {
    let store = db.read().await;
    let file = store
        .files
        .get(&id)
        .ok_or(Failure::Status(StatusCode::NOT_FOUND))?;
    ok(file.info.clone())
}

async fn delete_file(State(db): State<Db>, Path(id): Path<String>) -> Reply<Value> {
    let mut store = db.write().await;
    store
        .files
        .remove(&id)
        .ok_or(Failure::Status(StatusCode::NOT_FOUND))?;
    ok(Value::Null)
}

async fn download_file(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Response, Failure> {
    let store = db.read().await;
    let file = store
        .files
        .get(&id)
        .ok_or(Failure::Status(StatusCode::NOT_FOUND))?;
    Ok((
        [(header::CONTENT_TYPE, file.info.mime_type.clone())],
        file.bytes.clone(),
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct UnstableQuery {
    pub failures: Option<u32>,
}

/// Answers 503 for the first `failures` hits of each key, then succeeds with
/// the number of hits seen.
async fn unstable(
    State(db): State<Db>,
    Path(key): Path<String>,
    Query(query): Query<UnstableQuery>,
) -> Reply<u32> {
    let mut store = db.write().await;
    let hits = store.unstable_hits.entry(key).or_insert(0);
    *hits += 1;
    debug!(hits = *hits, "unstable endpoint hit");
    if *hits <= query.failures.unwrap_or(0) {
        return Err(Failure::Status(StatusCode::SERVICE_UNAVAILABLE));
    }
    ok(*hits)
}
