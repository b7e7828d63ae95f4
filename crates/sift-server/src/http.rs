//! reqwest-backed collaborators.
//!
//! The knowledge service exposes one collection per store:
//!
//! | Method   | Path | |
//! |----------|------|-|
//! | `GET`    | `/agents` | agent ids |
//! | `GET`    | `/agents/{agent}/{memories\|rules\|skills}` | items |
//! | `POST`   | `/agents/{agent}/{store}` | create, body is the artifact |
//! | `PUT`    | `/agents/{agent}/{store}/{id}` | replace |
//! | `DELETE` | `/agents/{agent}/{store}/{id}` | 404 counts as success |
//!
//! The analyzer service answers `POST /classify` with raw text and
//! `POST /extract/{rule|skill}` with a draft or `null`.

use std::{sync::Arc, time::Duration};

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use sift_core::{
  analysis::AnalysisRequest,
  artifact::{Artifact, RuleDraft, SkillDraft},
  item::{Inventory, KnowledgeItem},
  ports::{
    ArtifactExtractor, ClassifierError, CollectError, CommitError, Committers,
    KnowledgeCollector, SemanticAnalyzer, StorageCommitter,
  },
  store::Store,
};
use tracing::debug;

fn client(timeout: Duration) -> anyhow::Result<Client> {
  Client::builder().timeout(timeout).build().context("failed to build HTTP client")
}

fn base_url(raw: &str) -> anyhow::Result<Url> {
  let url = Url::parse(raw).with_context(|| format!("invalid base URL {raw:?}"))?;
  if url.cannot_be_a_base() {
    bail!("base URL {raw:?} cannot carry a path");
  }
  Ok(url)
}

/// `base` joined with percent-encoded `segments`.
fn join(base: &Url, segments: &[&str]) -> Url {
  let mut url = base.clone();
  if let Ok(mut path) = url.path_segments_mut() {
    path.pop_if_empty().extend(segments);
  }
  url
}

// ─── Knowledge service ───────────────────────────────────────────────────────

/// Items as the knowledge service returns them; the store is implied by the
/// collection they came from.
#[derive(Debug, Deserialize)]
struct WireItem {
  id:          String,
  #[serde(default)]
  name:        Option<String>,
  #[serde(default)]
  content:     String,
  #[serde(default)]
  condition:   Option<String>,
  #[serde(default)]
  action:      Option<String>,
  #[serde(default)]
  description: Option<String>,
  #[serde(default)]
  steps:       Vec<String>,
}

impl WireItem {
  fn into_item(self, store: Store) -> KnowledgeItem {
    KnowledgeItem {
      store,
      id: self.id,
      name: self.name,
      content: self.content,
      condition: self.condition,
      action: self.action,
      description: self.description,
      steps: self.steps,
    }
  }
}

#[derive(Debug, Deserialize)]
struct Created {
  #[serde(default)]
  id: Option<String>,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct KnowledgeClient {
  client: Client,
  base:   Url,
}

impl KnowledgeClient {
  pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
    Ok(Self { client: client(timeout)?, base: self::base_url(base_url)? })
  }

  /// One committer per store, all sharing this client.
  pub fn committers(&self) -> Committers {
    let committer = |store| Arc::new(StoreClient { inner: self.clone(), store });
    Committers {
      memory: committer(Store::Memory),
      rule:   committer(Store::Rule),
      skill:  committer(Store::Skill),
    }
  }

  async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, CollectError> {
    let url = join(&self.base, segments);
    let resp = self
      .client
      .get(url.clone())
      .send()
      .await
      .map_err(|e| CollectError(format!("GET {url}: {e}")))?;
    if !resp.status().is_success() {
      return Err(CollectError(format!("GET {url} → {}", resp.status())));
    }
    resp.json().await.map_err(|e| CollectError(format!("GET {url}: {e}")))
  }
}

#[async_trait]
impl KnowledgeCollector for KnowledgeClient {
  async fn list_agents(&self) -> Result<Vec<String>, CollectError> {
    self.get_json(&["agents"]).await
  }

  async fn fetch_all(&self, agent_id: &str) -> Result<Inventory, CollectError> {
    let mut inventory = Inventory::default();
    for store in Store::ALL {
      let items: Vec<WireItem> =
        self.get_json(&["agents", agent_id, store.path_segment()]).await?;
      let items = items.into_iter().map(|item| item.into_item(store)).collect();
      match store {
        Store::Memory => inventory.memories = items,
        Store::Rule => inventory.rules = items,
        Store::Skill => inventory.skills = items,
      }
    }
    debug!(agent_id, total = inventory.counts().total(), "inventory fetched");
    Ok(inventory)
  }
}

/// Committer for one store of the knowledge service.
pub struct StoreClient {
  inner: KnowledgeClient,
  store: Store,
}

impl StoreClient {
  fn url(&self, agent_id: &str, id: Option<&str>) -> Url {
    let mut segments = vec!["agents", agent_id, self.store.path_segment()];
    segments.extend(id);
    join(&self.inner.base, &segments)
  }
}

fn transport_error(e: reqwest::Error) -> CommitError {
  if e.is_connect() || e.is_timeout() {
    CommitError::Unavailable(e.to_string())
  } else {
    CommitError::Failed(e.to_string())
  }
}

async fn send(req: RequestBuilder) -> Result<Response, CommitError> {
  check(req.send().await.map_err(transport_error)?).await
}

async fn check(resp: Response) -> Result<Response, CommitError> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body = resp.text().await.unwrap_or_default();
  let message = format!("{status}: {body}");
  Err(match status {
    StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
      CommitError::Rejected(message)
    }
    StatusCode::BAD_GATEWAY
    | StatusCode::SERVICE_UNAVAILABLE
    | StatusCode::GATEWAY_TIMEOUT => CommitError::Unavailable(message),
    _ => CommitError::Failed(message),
  })
}

#[async_trait]
impl StorageCommitter for StoreClient {
  async fn create(
    &self,
    agent_id: &str,
    artifact: &Artifact,
  ) -> Result<Option<String>, CommitError> {
    let req = self.inner.client.post(self.url(agent_id, None)).json(artifact);
    let resp = send(req).await?;
    // Some stores answer 204 with no body.
    let created: Option<Created> = resp.json().await.ok();
    Ok(created.and_then(|c| c.id))
  }

  async fn update(
    &self,
    agent_id: &str,
    id: &str,
    artifact: &Artifact,
  ) -> Result<(), CommitError> {
    send(self.inner.client.put(self.url(agent_id, Some(id))).json(artifact)).await?;
    Ok(())
  }

  async fn delete(&self, agent_id: &str, id: &str) -> Result<(), CommitError> {
    let url = self.url(agent_id, Some(id));
    let resp = self.inner.client.delete(url).send().await.map_err(transport_error)?;
    if resp.status() == StatusCode::NOT_FOUND {
      debug!(agent_id, store = %self.store, item_id = id, "already absent");
      return Ok(());
    }
    check(resp).await?;
    Ok(())
  }
}

// ─── Analyzer service ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AnalyzerClient {
  client: Client,
  base:   Url,
}

impl AnalyzerClient {
  pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
    Ok(Self { client: client(timeout)?, base: self::base_url(base_url)? })
  }

  async fn post(
    &self,
    segments: &[&str],
    body: &serde_json::Value,
  ) -> Result<Response, ClassifierError> {
    let url = join(&self.base, segments);
    let resp = self
      .client
      .post(url.clone())
      .json(body)
      .send()
      .await
      .map_err(|e| ClassifierError(format!("POST {url}: {e}")))?;
    if !resp.status().is_success() {
      return Err(ClassifierError(format!("POST {url} → {}", resp.status())));
    }
    Ok(resp)
  }

  async fn extract<T: DeserializeOwned>(
    &self,
    kind: &str,
    content: &str,
  ) -> Result<Option<T>, ClassifierError> {
    let resp = self.post(&["extract", kind], &json!({ "content": content })).await?;
    if resp.status() == StatusCode::NO_CONTENT {
      return Ok(None);
    }
    resp.json().await.map_err(|e| ClassifierError(format!("extract {kind}: {e}")))
  }
}

#[async_trait]
impl SemanticAnalyzer for AnalyzerClient {
  async fn classify(&self, request: &AnalysisRequest) -> Result<String, ClassifierError> {
    let body = serde_json::to_value(request).map_err(|e| ClassifierError(e.to_string()))?;
    let resp = self.post(&["classify"], &body).await?;
    resp.text().await.map_err(|e| ClassifierError(format!("classify: {e}")))
  }
}

#[async_trait]
impl ArtifactExtractor for AnalyzerClient {
  async fn extract_rule(&self, content: &str) -> Result<Option<RuleDraft>, ClassifierError> {
    self.extract("rule", content).await
  }

  async fn extract_skill(&self, content: &str) -> Result<Option<SkillDraft>, ClassifierError> {
    self.extract("skill", content).await
  }
}
