//! Azure AI Search REST backend
//!
//! Issues a pure vector query against the listing index. By default the query
//! text is vectorized by the index's own vectorizer (`kind: "text"`). When an
//! embedding deployment is configured, the query is embedded through Azure
//! OpenAI first and sent as a raw vector (`kind: "vector"`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{SearchBackend, SearchError};
use crate::core::credentials::Credential;

/// API version of the Azure OpenAI embeddings endpoint
pub const EMBEDDINGS_API_VERSION: &str = "2024-06-01";

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct AzureSearchConfig {
    /// `https://{service}.search.windows.net` or an override
    pub base_url: String,
    pub index: String,
    pub api_version: String,
    /// Vector field queried in the index
    pub vector_field: String,
    /// Azure OpenAI deployment used to embed queries client-side
    pub embedding_deployment: Option<String>,
    /// Azure OpenAI endpoint hosting the embedding deployment
    pub llm_endpoint: String,
}

impl AzureSearchConfig {
    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.base_url.trim_end_matches('/'),
            self.index,
            self.api_version
        )
    }

    fn embeddings_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.llm_endpoint.trim_end_matches('/'),
            deployment,
            EMBEDDINGS_API_VERSION
        )
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct AzureSearchBackend {
    config: AzureSearchConfig,
    http: reqwest::Client,
    credential: Credential,
    /// Used only for the embeddings endpoint
    llm_credential: Credential,
}

impl AzureSearchBackend {
    pub fn new(
        config: AzureSearchConfig,
        http: reqwest::Client,
        credential: Credential,
        llm_credential: Credential,
    ) -> Self {
        Self {
            config,
            http,
            credential,
            llm_credential,
        }
    }

    async fn vector_query(&self, query: &str, k: usize) -> Result<Value, SearchError> {
        match &self.config.embedding_deployment {
            None => Ok(json!({
                "kind": "text",
                "text": query,
                "fields": self.config.vector_field,
                "k": k,
            })),
            Some(deployment) => {
                let vector = self.embed(deployment, query).await?;
                Ok(json!({
                    "kind": "vector",
                    "vector": vector,
                    "fields": self.config.vector_field,
                    "k": k,
                }))
            }
        }
    }

    async fn embed(&self, deployment: &str, query: &str) -> Result<Vec<f32>, SearchError> {
        let auth = self.llm_credential.auth_header().await?;
        let response = self
            .http
            .post(self.config.embeddings_url(deployment))
            .header(auth.name, auth.value)
            .json(&json!({ "input": query }))
            .send()
            .await
            .map_err(|e| SearchError::Unavailable(format!("Embedding request failed: {e}")))?;

        let response = check_status(response, "Embedding").await?;
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| SearchError::InvalidResponse("embedding response has no data".to_string()))
    }
}

#[async_trait]
impl SearchBackend for AzureSearchBackend {
    async fn search_by_embedding(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Map<String, Value>>, SearchError> {
        let body = json!({
            "top": k,
            "vectorQueries": [self.vector_query(query, k).await?],
        });

        let auth = self.credential.auth_header().await?;
        let response = self
            .http
            .post(self.config.search_url())
            .header(auth.name, auth.value)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Unavailable(format!("Search request failed: {e}")))?;

        let response = check_status(response, "Search").await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        debug!(index = %self.config.index, hits = parsed.value.len(), "Azure AI Search query done");
        Ok(parsed.value)
    }

    async fn warm_up(&self) -> Result<(), SearchError> {
        self.credential.warm_up().await?;
        if self.config.embedding_deployment.is_some() {
            self.llm_credential.warm_up().await?;
        }
        Ok(())
    }
}

async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, SearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    body.truncate(
        body.char_indices()
            .nth(MAX_ERROR_BODY)
            .map_or(body.len(), |(i, _)| i),
    );
    Err(SearchError::Unavailable(format!(
        "{what} endpoint returned {status}: {body}"
    )))
}
