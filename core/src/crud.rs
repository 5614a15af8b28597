//! Generic CRUD calls for resources without a dedicated module.
//!
//! Each call targets `{url}` or `{url}/{id}` on the bound service and
//! returns the envelope payload.

use std::fmt::Display;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::HttpClient;
use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct Crud {
    http: HttpClient,
}

impl Crud {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn get_list<T, Q>(&self, url: &str, query: &Q) -> Result<Vec<T>, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        Ok(self.http.get::<Vec<T>, Q>(url, query).await?.data)
    }

    pub async fn get_detail<T: DeserializeOwned>(
        &self,
        url: &str,
        id: impl Display,
    ) -> Result<T, ApiError> {
        Ok(self.http.get::<T, _>(&format!("{url}/{id}"), &()).await?.data)
    }

    pub async fn create<T, B>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        Ok(self.http.post::<T, B>(url, body).await?.data)
    }

    pub async fn update<T, B>(&self, url: &str, id: impl Display, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        Ok(self.http.put::<T, B>(&format!("{url}/{id}"), body).await?.data)
    }

    /// Whatever payload the server returns for the deletion.
    pub async fn delete(&self, url: &str, id: impl Display) -> Result<serde_json::Value, ApiError> {
        Ok(self
            .http
            .delete::<serde_json::Value, _>(&format!("{url}/{id}"), &())
            .await?
            .data)
    }
}
