//! HTTP query executor for Elasticsearch-compatible search deployments.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value};
use sparsebench_core::{SearchHit, SearchOutcome, TargetConfig, TargetDescriptor};
use sparsebench_engine::{ExecutorError, ExecutorResult, QueryExecutor};

/// Field holding the sparse token weights produced by the inference pipeline.
const TOKENS_FIELD: &str = "ml.tokens";
/// Document fields returned with each hit.
const SOURCE_FIELDS: [&str; 4] = ["line_id", "play_name", "speaker", "text_entry"];
/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

pub struct HttpSearchExecutor {
    client: reqwest::Client,
    descriptor: TargetDescriptor,
    endpoint: String,
    index: String,
    fallback_index: String,
    top_n: usize,
    timeout: Duration,
    fallback_to_match: bool,
}

impl HttpSearchExecutor {
    pub fn new(config: &TargetConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("ApiKey {api_key}"))
                .with_context(|| format!("API key for target {} is not a valid header value", config.name))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            descriptor: config.descriptor(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            fallback_index: config.fallback_index.clone(),
            top_n: config.top_n,
            timeout,
            fallback_to_match: config.fallback_to_match,
        })
    }

    fn search_url(&self, index: &str) -> String {
        format!("{}/{}/_search", self.endpoint, index)
    }

    async fn search(&self, index: &str, body: &Value) -> ExecutorResult<SearchOutcome> {
        let response = self
            .client
            .post(self.search_url(index))
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(ExecutorError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        parse_search_response(&bytes)
    }

    fn map_transport_error(&self, error: reqwest::Error) -> ExecutorError {
        if error.is_timeout() {
            ExecutorError::Timeout(self.timeout)
        } else {
            ExecutorError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl QueryExecutor for HttpSearchExecutor {
    fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    async fn execute(&self, query: &str) -> ExecutorResult<SearchOutcome> {
        let sparse = sparse_query_body(query, &self.descriptor.model_id, self.top_n);

        match self.search(&self.index, &sparse).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if self.fallback_to_match => {
                tracing::warn!(
                    target_name = %self.descriptor.name,
                    error = %e,
                    "Sparse query failed, retrying as lexical match"
                );
                let lexical = match_query_body(query, self.top_n);
                let mut outcome = self.search(&self.fallback_index, &lexical).await?;
                outcome.degraded = true;
                Ok(outcome)
            }
            Err(e) => Err(e),
        }
    }
}

fn sparse_query_body(query: &str, model_id: &str, size: usize) -> Value {
    json!({
        "query": {
            "text_expansion": {
                TOKENS_FIELD: {
                    "model_id": model_id,
                    "model_text": query
                }
            }
        },
        "size": size,
        "_source": SOURCE_FIELDS
    })
}

fn match_query_body(query: &str, size: usize) -> Value {
    json!({
        "query": {
            "match": {
                "text_entry": query
            }
        },
        "size": size,
        "_source": SOURCE_FIELDS
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Object { value: u64 },
    Count(u64),
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Option<HitSource>,
}

#[derive(Debug, Default, Deserialize)]
struct HitSource {
    play_name: Option<String>,
    speaker: Option<String>,
    #[serde(default)]
    text_entry: String,
}

fn parse_search_response(body: &[u8]) -> ExecutorResult<SearchOutcome> {
    let response: SearchResponse =
        serde_json::from_slice(body).map_err(|e| ExecutorError::InvalidResponse(e.to_string()))?;

    let top_results: Vec<SearchHit> = response
        .hits
        .hits
        .into_iter()
        .map(|hit| {
            let source = hit.source.unwrap_or_default();
            SearchHit::new(hit.score, source.play_name, source.speaker, &source.text_entry)
        })
        .collect();

    let hit_count = match response.hits.total {
        Some(TotalHits::Object { value }) | Some(TotalHits::Count(value)) => value,
        None => top_results.len() as u64,
    };

    Ok(SearchOutcome {
        hit_count,
        top_results,
        degraded: false,
    })
}
