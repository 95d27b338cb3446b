//! Native-store-as-remote provider: used when the remote side of a mirror is
//! itself another native store cluster rather than an S3-compatible bucket.
//!
//! Speaks the same account/container/object REST surface as `local_store`,
//! just against a remote endpoint and credential pair, so this module is a
//! thin reqwest client rather than a full second copy of that crate's logic.

use std::collections::HashMap;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use futures::TryStreamExt;

use crate::error::ProviderError;
use crate::{BodyStream, CompletedPart, ListingEntry, ListingPage, PutMetadata, RemoteObjectMeta};

#[derive(Debug, Clone)]
pub struct NativeProviderConfig {
    pub endpoint: String,
    pub account: String,
    pub container: String,
    pub auth_token: String,
}

pub struct NativeProvider {
    http: reqwest::Client,
    config: NativeProviderConfig,
}

impl NativeProvider {
    pub fn new(config: NativeProviderConfig) -> Self {
        let http = reqwest::Client::builder()
            .build()
            .expect("static client config is always valid");
        Self { http, config }
    }

    fn account_url(&self) -> String {
        format!("{}/v1/{}", self.config.endpoint.trim_end_matches('/'), self.config.account)
    }

    fn container_url(&self) -> String {
        format!(
            "{}/v1/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.account,
            self.config.container
        )
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.container_url(), key)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("X-Auth-Token", &self.config.auth_token)
    }

    pub async fn list(&self, prefix: Option<&str>, marker: Option<&str>, max_keys: i32) -> Result<ListingPage, ProviderError> {
        let mut request = self.authed(self.http.get(self.container_url())).query(&[
            ("format", "json"),
            ("limit", &max_keys.to_string()),
        ]);
        if let Some(prefix) = prefix {
            request = request.query(&[("prefix", prefix)]);
        }
        if let Some(marker) = marker {
            request = request.query(&[("marker", marker)]);
        }
        let response = request.send().await.map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(status_err(response.status().as_u16()));
        }
        let entries: Vec<NativeListingEntry> = response.json().await.map_err(transport_err)?;
        let next_marker = if entries.len() as i32 == max_keys {
            entries.last().map(|e| e.name.clone())
        } else {
            None
        };
        Ok(ListingPage {
            entries: entries
                .into_iter()
                .map(|e| ListingEntry {
                    key: e.name,
                    etag: e.hash,
                    size: e.bytes,
                    last_modified: UNIX_EPOCH,
                })
                .collect(),
            next_marker,
        })
    }

    pub async fn head(&self, key: &str) -> Result<Option<RemoteObjectMeta>, ProviderError> {
        let response = self
            .authed(self.http.head(self.object_url(key)))
            .send()
            .await
            .map_err(transport_err)?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_err(response.status().as_u16()));
        }
        Ok(Some(meta_from_headers(response.headers())))
    }

    pub async fn get(&self, key: &str) -> Result<(RemoteObjectMeta, BodyStream), ProviderError> {
        let response = self
            .authed(self.http.get(self.object_url(key)))
            .send()
            .await
            .map_err(transport_err)?;
        if response.status().as_u16() == 404 {
            return Err(ProviderError::NotFound);
        }
        if !response.status().is_success() {
            return Err(status_err(response.status().as_u16()));
        }
        let meta = meta_from_headers(response.headers());
        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok((meta, Box::pin(stream)))
    }

    pub async fn put(&self, key: &str, body: BodyStream, content_length: u64, meta: &PutMetadata) -> Result<String, ProviderError> {
        let bytes = collect_body(body).await?;
        let mut request = self
            .authed(self.http.put(self.object_url(key)))
            .header("Content-Length", content_length);
        if let Some(content_type) = &meta.content_type {
            request = request.header("Content-Type", content_type.clone());
        }
        if let Some(md5) = &meta.content_md5 {
            request = request.header("Content-MD5", md5.clone());
        }
        for (k, v) in &meta.user_metadata {
            request = request.header(format!("x-object-meta-{k}"), v);
        }
        let response = request.body(bytes).send().await.map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(status_err(response.status().as_u16()));
        }
        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Ok(crate::strip_etag_quotes(etag).to_string())
    }

    /// A peer native store updates metadata in place with a plain POST,
    /// unlike the self-copy an S3-compatible bucket needs (§4.1).
    pub async fn post_metadata(&self, key: &str, meta: &PutMetadata) -> Result<(), ProviderError> {
        let mut request = self.authed(self.http.post(self.object_url(key)));
        if let Some(content_type) = &meta.content_type {
            request = request.header("Content-Type", content_type.clone());
        }
        for (k, v) in &meta.user_metadata {
            request = request.header(format!("x-object-meta-{k}"), v);
        }
        let response = request.send().await.map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(status_err(response.status().as_u16()));
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), ProviderError> {
        let response = self
            .authed(self.http.delete(self.object_url(key)))
            .send()
            .await
            .map_err(transport_err)?;
        if response.status().as_u16() == 404 {
            return Err(ProviderError::NotFound);
        }
        if !response.status().is_success() {
            return Err(status_err(response.status().as_u16()));
        }
        Ok(())
    }

    /// The peer container's own headers, or `None` once it has been deleted
    /// on the remote side (§4.3 "Container lifecycle").
    pub async fn head_container_headers(&self) -> Result<Option<HashMap<String, String>>, ProviderError> {
        let response = self.authed(self.http.head(self.container_url())).send().await.map_err(transport_err)?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_err(response.status().as_u16()));
        }
        Ok(Some(headers_to_map(response.headers())))
    }

    pub async fn head_account_headers(&self) -> Result<HashMap<String, String>, ProviderError> {
        let response = self.authed(self.http.head(self.account_url())).send().await.map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(status_err(response.status().as_u16()));
        }
        Ok(headers_to_map(response.headers()))
    }

    // A peer native store has no multipart concept; large objects are always
    // written as a manifest of plain segment PUTs, so these are unreachable
    // from RemoteProvider::Native (gated by supports_multipart()).

    #[allow(unused)]
    pub async fn create_multipart(&self, _key: &str, _meta: &PutMetadata) -> Result<String, ProviderError> {
        unreachable!("native peer provider never advertises multipart support")
    }

    #[allow(unused)]
    pub async fn upload_part(
        &self,
        _key: &str,
        _upload_id: &str,
        _part_number: i32,
        _body: Bytes,
        _content_md5: Option<&str>,
    ) -> Result<String, ProviderError> {
        unreachable!("native peer provider never advertises multipart support")
    }

    #[allow(unused)]
    pub async fn complete_multipart(&self, _key: &str, _upload_id: &str, _parts: &[CompletedPart]) -> Result<String, ProviderError> {
        unreachable!("native peer provider never advertises multipart support")
    }
}

#[derive(serde::Deserialize)]
struct NativeListingEntry {
    name: String,
    hash: String,
    bytes: u64,
}

fn headers_to_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_lowercase(), v.to_string())))
        .collect()
}

fn meta_from_headers(headers: &reqwest::header::HeaderMap) -> RemoteObjectMeta {
    let mut user_metadata = HashMap::new();
    for (name, value) in headers {
        if let Some(stripped) = name.as_str().strip_prefix("x-object-meta-") {
            if let Ok(value) = value.to_str() {
                user_metadata.insert(stripped.to_string(), value.to_string());
            }
        }
    }
    let etag = headers.get("etag").and_then(|v| v.to_str().ok()).unwrap_or_default();
    RemoteObjectMeta {
        etag: crate::strip_etag_quotes(etag).to_string(),
        content_length: headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        content_type: headers.get("content-type").and_then(|v| v.to_str().ok()).map(str::to_string),
        user_metadata,
        last_modified: None,
        storage_class: None,
    }
}

async fn collect_body(body: BodyStream) -> Result<Bytes, ProviderError> {
    use futures::StreamExt;
    let mut buf = Vec::new();
    let mut body = body;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ProviderError::Transient(anyhow::anyhow!(e)))?;
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

fn transport_err(err: reqwest::Error) -> ProviderError {
    ProviderError::Transient(anyhow::anyhow!(err))
}

fn status_err(status: u16) -> ProviderError {
    if status >= 500 || status == 429 {
        ProviderError::Transient(anyhow::anyhow!("peer store returned HTTP {status}"))
    } else {
        ProviderError::Permanent(anyhow::anyhow!("peer store returned HTTP {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_url_joins_account_container_and_key() {
        let provider = NativeProvider::new(NativeProviderConfig {
            endpoint: "http://peer.example".into(),
            account: "acct".into(),
            container: "cont".into(),
            auth_token: "tok".into(),
        });
        assert_eq!(provider.object_url("a/b"), "http://peer.example/v1/acct/cont/a/b");
    }
}
