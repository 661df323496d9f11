use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use listing_core_types::DraftId;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::errors::{RemoteError, Result};

/// The target site's draft record: read whole, written in partial patches.
#[async_trait]
pub trait DraftApi: Send + Sync {
    async fn get_draft(&self, id: &DraftId) -> Result<Value>;

    async fn put_draft(&self, id: &DraftId, partial: Value) -> Result<()>;
}

/// `GET/PUT {base}/drafts/{id}` with JSON bodies.
#[derive(Clone)]
pub struct HttpDraftApi {
    client: Client,
    base: Url,
}

impl HttpDraftApi {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .use_rustls_tls()
            .build()?;
        Ok(Self { client, base })
    }

    fn draft_url(&self, id: &DraftId) -> Result<Url> {
        Ok(self.base.join("drafts/")?.join(&id.0)?)
    }
}

#[async_trait]
impl DraftApi for HttpDraftApi {
    async fn get_draft(&self, id: &DraftId) -> Result<Value> {
        let url = self.draft_url(id)?;
        debug!(%url, "GET draft");
        let response = self.client.get(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(id.to_string())),
            status => Err(RemoteError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn put_draft(&self, id: &DraftId, partial: Value) -> Result<()> {
        let url = self.draft_url(id)?;
        debug!(%url, "PUT draft");
        let response = self.client.put(url).json(&partial).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            Err(RemoteError::NotFound(id.to_string()))
        } else if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            Err(RemoteError::Rejected {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Draft records kept in memory; patches are merged like the site does.
///
/// Top-level keys listed in `rejected_keys` fail with 400, which lets
/// callers exercise alternate payload shapes offline.
#[derive(Default)]
pub struct InMemoryDraftApi {
    drafts: DashMap<String, Value>,
    rejected_keys: Vec<String>,
}

impl InMemoryDraftApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.rejected_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn insert(&self, id: &DraftId, draft: Value) {
        self.drafts.insert(id.0.clone(), draft);
    }

    pub fn snapshot(&self, id: &DraftId) -> Option<Value> {
        self.drafts.get(&id.0).map(|draft| draft.value().clone())
    }
}

#[async_trait]
impl DraftApi for InMemoryDraftApi {
    async fn get_draft(&self, id: &DraftId) -> Result<Value> {
        self.snapshot(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn put_draft(&self, id: &DraftId, partial: Value) -> Result<()> {
        if let Some(key) = partial
            .as_object()
            .and_then(|object| object.keys().find(|key| self.rejected_keys.contains(key)))
        {
            return Err(RemoteError::Rejected {
                status: 400,
                body: format!("unknown field {key}"),
            });
        }
        let mut entry = self
            .drafts
            .get_mut(&id.0)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        merge(entry.value_mut(), partial);
        Ok(())
    }
}

/// Deep-merges objects; anything else replaces.
pub fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_deep() {
        let mut draft = json!({"title": "a", "pricing": {"price": 1, "currency": "USD"}});
        merge(&mut draft, json!({"pricing": {"price": 2}}));
        assert_eq!(draft, json!({"title": "a", "pricing": {"price": 2, "currency": "USD"}}));
    }

    #[test]
    fn draft_urls_are_joined_under_base() {
        let api = HttpDraftApi::new("https://api.shop.test/v1", Duration::from_secs(5)).unwrap();
        let url = api.draft_url(&DraftId("42".into())).unwrap();
        assert_eq!(url.as_str(), "https://api.shop.test/v1/drafts/42");
    }

    #[tokio::test]
    async fn in_memory_rejects_listed_keys() {
        let api = InMemoryDraftApi::new().rejecting(["itemTitle"]);
        let id = DraftId("1".into());
        api.insert(&id, json!({}));
        assert!(matches!(
            api.put_draft(&id, json!({"itemTitle": "x"})).await,
            Err(RemoteError::Rejected { status: 400, .. })
        ));
        api.put_draft(&id, json!({"title": "x"})).await.unwrap();
        assert_eq!(api.get_draft(&id).await.unwrap()["title"], "x");
    }
}
