//! File storage endpoints: uploads, listing, downloads and folders.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::HttpClient;
use crate::config::ServiceName;
use crate::error::ApiError;
use crate::http::{FileUpload, MultipartForm};
use crate::modules::{label, labeled, ApiModule};
use crate::types::{Paginated, PaginationParams, UploadResponse};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub uploaded_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Extra form fields sent alongside an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_thumbnail: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUpload {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUploadResult {
    pub success: Vec<UploadResponse>,
    pub failed: Vec<FailedUpload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrl {
    pub url: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub name: String,
    pub path: String,
    pub file_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedFolder {
    pub name: String,
    pub path: String,
}

#[derive(Serialize)]
struct CopyTarget<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    folder: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewFolder<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_path: Option<&'a str>,
}

/// File service operations.
#[derive(Debug, Clone)]
pub struct FileApi {
    http: HttpClient,
}

impl ApiModule for FileApi {
    const NAME: &'static str = "file";
    const SERVICE: ServiceName = ServiceName::File;

    fn from_client(http: HttpClient) -> Self {
        Self { http }
    }

    fn http(&self) -> &HttpClient {
        &self.http
    }
}

impl FileApi {
    pub async fn upload_file(
        &self,
        file: FileUpload,
        options: Option<&UploadOptions>,
    ) -> Result<UploadResponse, ApiError> {
        let form = with_options(MultipartForm::from(file), options)
            .map_err(|e| label(Self::NAME, "upload file", e))?;
        labeled(Self::NAME, "upload file", self.http.upload("/upload", form)).await
    }

    /// Files are sent as `files[0]`, `files[1]`, ...
    pub async fn upload_files(
        &self,
        files: Vec<FileUpload>,
        options: Option<&UploadOptions>,
    ) -> Result<BatchUploadResult, ApiError> {
        let form = files
            .into_iter()
            .enumerate()
            .fold(MultipartForm::new(), |form, (index, file)| {
                form.file(format!("files[{index}]"), file)
            });
        let form =
            with_options(form, options).map_err(|e| label(Self::NAME, "batch upload files", e))?;
        labeled(
            Self::NAME,
            "batch upload files",
            self.http.upload("/upload/batch", form),
        )
        .await
    }

    pub async fn get_file_list(&self, query: &FileListQuery) -> Result<Paginated<FileInfo>, ApiError> {
        labeled(Self::NAME, "get file list", self.http.get("/files", query)).await
    }

    pub async fn get_file_detail(&self, file_id: &str) -> Result<FileInfo, ApiError> {
        labeled(
            Self::NAME,
            "get file detail",
            self.http.get(&format!("/files/{file_id}"), &()),
        )
        .await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), ApiError> {
        labeled(
            Self::NAME,
            "delete file",
            self.http.delete(&format!("/files/{file_id}"), &()),
        )
        .await
    }

    pub async fn delete_files(&self, file_ids: &[String]) -> Result<(), ApiError> {
        labeled(
            Self::NAME,
            "batch delete files",
            self.http
                .post("/files/batch-delete", &json!({ "fileIds": file_ids })),
        )
        .await
    }

    /// Save the file into the client's download directory.
    pub async fn download_file(&self, file_id: &str, filename: Option<&str>) -> Result<(), ApiError> {
        self.http
            .download(&format!("/files/{file_id}/download"), &(), filename)
            .await
            .map_err(|e| label(Self::NAME, "download file", e))
    }

    pub async fn get_download_url(
        &self,
        file_id: &str,
        expires_in: Option<u64>,
    ) -> Result<DownloadUrl, ApiError> {
        labeled(
            Self::NAME,
            "get download url",
            self.http.get(
                &format!("/files/{file_id}/download-url"),
                &json!({ "expiresIn": expires_in }),
            ),
        )
        .await
    }

    pub async fn rename_file(&self, file_id: &str, new_name: &str) -> Result<FileInfo, ApiError> {
        labeled(
            Self::NAME,
            "rename file",
            self.http.put(
                &format!("/files/{file_id}/rename"),
                &json!({ "filename": new_name }),
            ),
        )
        .await
    }

    pub async fn move_file(&self, file_id: &str, target_folder: &str) -> Result<FileInfo, ApiError> {
        labeled(
            Self::NAME,
            "move file",
            self.http.put(
                &format!("/files/{file_id}/move"),
                &json!({ "folder": target_folder }),
            ),
        )
        .await
    }

    pub async fn copy_file(
        &self,
        file_id: &str,
        target_folder: Option<&str>,
    ) -> Result<FileInfo, ApiError> {
        labeled(
            Self::NAME,
            "copy file",
            self.http.post(
                &format!("/files/{file_id}/copy"),
                &CopyTarget {
                    folder: target_folder,
                },
            ),
        )
        .await
    }

    pub async fn get_folders(&self) -> Result<Vec<Folder>, ApiError> {
        labeled(Self::NAME, "get folders", self.http.get("/folders", &())).await
    }

    pub async fn create_folder(
        &self,
        name: &str,
        parent_path: Option<&str>,
    ) -> Result<CreatedFolder, ApiError> {
        labeled(
            Self::NAME,
            "create folder",
            self.http.post("/folders", &NewFolder { name, parent_path }),
        )
        .await
    }

    pub async fn delete_folder(&self, folder_path: &str) -> Result<(), ApiError> {
        labeled(
            Self::NAME,
            "delete folder",
            self.http.delete("/folders", &json!({ "path": folder_path })),
        )
        .await
    }
}

fn with_options(form: MultipartForm, options: Option<&UploadOptions>) -> Result<MultipartForm, ApiError> {
    match options {
        Some(options) => form.fields(options),
        None => Ok(form),
    }
}
