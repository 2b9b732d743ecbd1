//! Cloudinary upload API client.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::media_store::{DeleteOutcome, MediaStore, MediaStoreError, UploadedMedia};
use crate::{config::CloudinaryConfig, models::media::MediaKind};

const DELIVERY_BASE: &str = "https://res.cloudinary.com";

#[derive(Debug, Clone)]
pub struct CloudinaryStore {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
    resource_type: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig, timeout: std::time::Duration) -> Result<Self, MediaStoreError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, kind: MediaKind, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            kind,
            action
        )
    }

    /// Signature over the request parameters: sorted `k=v` pairs joined with
    /// `&`, followed by the API secret, hashed with SHA-256.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        hex::encode(Sha256::digest(format!("{to_sign}{}", self.config.api_secret)))
    }

    fn signed_params(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        let signature = self.sign(&params);
        params.push(("signature", signature));
        params.push(("signature_algorithm", "sha256".to_string()));
        params.push(("api_key", self.config.api_key.clone()));
        params
    }

    async fn destroy(&self, public_id: &str, kind: MediaKind) -> Result<DeleteOutcome, MediaStoreError> {
        let params = self.signed_params(vec![
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp()),
        ]);

        let response = self
            .http
            .post(self.endpoint(kind, "destroy"))
            .form(&params)
            .send()
            .await?;
        let destroyed: DestroyResponse = error_for_status(response).await?.json().await?;

        match destroyed.result.as_str() {
            "ok" => Ok(DeleteOutcome::Deleted),
            "not found" => Ok(DeleteOutcome::AlreadyGone),
            other => Err(MediaStoreError::Rejected(format!(
                "destroy of '{public_id}' returned '{other}'"
            ))),
        }
    }

    /// Small preview for images and videos; raw files have none.
    pub fn thumbnail_url(&self, public_id: &str, kind: MediaKind) -> Option<String> {
        match kind {
            MediaKind::Image => Some(format!(
                "{DELIVERY_BASE}/{}/image/upload/w_480,c_limit/{public_id}",
                self.config.cloud_name
            )),
            MediaKind::Video => Some(format!(
                "{DELIVERY_BASE}/{}/video/upload/so_0,w_480,c_limit/{public_id}.jpg",
                self.config.cloud_name
            )),
            MediaKind::Raw | MediaKind::Auto => None,
        }
    }
}

fn timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, MediaStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(MediaStoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn upload(&self, bytes: Vec<u8>, kind: MediaKind) -> Result<UploadedMedia, MediaStoreError> {
        let params = self.signed_params(vec![("timestamp", timestamp())]);

        let mut form = Form::new().part("file", Part::bytes(bytes).file_name("upload"));
        for (key, value) in params {
            form = form.text(key, value);
        }

        let response = self
            .http
            .post(self.endpoint(kind, "upload"))
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = error_for_status(response).await?.json().await?;

        let kind = uploaded.resource_type.parse().unwrap_or(kind);
        tracing::debug!(public_id = %uploaded.public_id, %kind, "media uploaded");

        Ok(UploadedMedia {
            thumbnail_url: self.thumbnail_url(&uploaded.public_id, kind),
            public_id: uploaded.public_id,
            url: uploaded.secure_url,
            kind,
        })
    }

    async fn delete(&self, public_id: &str, kind: MediaKind) -> Result<DeleteOutcome, MediaStoreError> {
        if kind != MediaKind::Auto {
            return self.destroy(public_id, kind).await;
        }

        // Destroy needs a concrete resource type; untyped rows may be any of them.
        for candidate in [MediaKind::Image, MediaKind::Video, MediaKind::Raw] {
            if self.destroy(public_id, candidate).await? == DeleteOutcome::Deleted {
                return Ok(DeleteOutcome::Deleted);
            }
        }
        tracing::warn!(public_id, "untyped media not found under any resource type");
        Ok(DeleteOutcome::AlreadyGone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use axum::{Json, Router, extract::Path, routing::post};

    fn store() -> CloudinaryStore {
        CloudinaryStore::new(
            CloudinaryConfig {
                cloud_name: "demo".into(),
                api_key: "1234".into(),
                api_secret: "abcd".into(),
                api_base: "https://api.cloudinary.com/v1_1/".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn signature_sorts_parameters() {
        let signature = store().sign(&[
            ("timestamp", "1315060510".to_string()),
            ("public_id", "sample".to_string()),
        ]);

        assert_eq!(
            signature,
            "0d4fe14b2b4a3f68a97ccc5097c43908b623d24293c296826a9390c14d891509"
        );
    }

    #[test]
    fn signed_params_carry_key_and_algorithm() {
        let params = store().signed_params(vec![("timestamp", "1".to_string())]);
        let keys: Vec<&str> = params.iter().map(|(k, _)| *k).collect();

        assert_eq!(
            keys,
            vec!["timestamp", "signature", "signature_algorithm", "api_key"]
        );
    }

    #[test]
    fn endpoints_include_cloud_and_resource_type() {
        assert_eq!(
            store().endpoint(MediaKind::Video, "destroy"),
            "https://api.cloudinary.com/v1_1/demo/video/destroy"
        );
    }

    #[test]
    fn thumbnails_only_for_visual_media() {
        let store = store();
        assert_eq!(
            store.thumbnail_url("abc", MediaKind::Video).as_deref(),
            Some("https://res.cloudinary.com/demo/video/upload/so_0,w_480,c_limit/abc.jpg")
        );
        assert!(store.thumbnail_url("abc", MediaKind::Image).is_some());
        assert!(store.thumbnail_url("abc", MediaKind::Raw).is_none());
    }

    /// Local stand-in for the destroy endpoint. Only `stored_as` holds the
    /// object; every request path is recorded.
    async fn fake_destroy_api(stored_as: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let app = Router::new().route(
            "/demo/{kind}/destroy",
            post(move |Path(kind): Path<String>| {
                let recorded = recorded.clone();
                async move {
                    let result = if kind == stored_as { "ok" } else { "not found" };
                    recorded.lock().unwrap().push(kind);
                    Json(serde_json::json!({ "result": result }))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (base, calls)
    }

    fn store_at(api_base: String) -> CloudinaryStore {
        CloudinaryStore::new(
            CloudinaryConfig {
                cloud_name: "demo".into(),
                api_key: "1234".into(),
                api_secret: "abcd".into(),
                api_base,
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn untyped_video_is_destroyed_as_video() {
        let (base, calls) = fake_destroy_api("video").await;

        let outcome = store_at(base).delete("clip", MediaKind::Auto).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(*calls.lock().unwrap(), vec!["image", "video"]);
    }

    #[tokio::test]
    async fn untyped_media_missing_everywhere_is_already_gone() {
        let (base, calls) = fake_destroy_api("nowhere").await;

        let outcome = store_at(base).delete("ghost", MediaKind::Auto).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::AlreadyGone);
        assert_eq!(*calls.lock().unwrap(), vec!["image", "video", "raw"]);
    }

    #[tokio::test]
    async fn typed_media_is_destroyed_once() {
        let (base, calls) = fake_destroy_api("video").await;

        let outcome = store_at(base).delete("photo", MediaKind::Image).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::AlreadyGone);
        assert_eq!(*calls.lock().unwrap(), vec!["image"]);
    }
}
