// author: kodeholic (powered by Claude)
// QuestionCatalog - 외부 문제 카탈로그 서비스 인터페이스
//
// StaticCatalog : 프로세스 내 문제 은행 (기본값, 테스트용)
// HttpCatalog   : GET {base}/questions/pick?difficulty=..&topic=.. → {"questionId": ".."}

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

use crate::core::Difficulty;
use crate::error::{MatchError, MatchResult};

#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    async fn pick(&self, difficulty: Difficulty, topic: &str) -> MatchResult<String>;
}

// ----------------------------------------------------------------------------
// [StaticCatalog]
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct StaticCatalog {
    bank: HashMap<(Difficulty, String), Vec<String>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_question(mut self, difficulty: Difficulty, topic: &str, question_id: &str) -> Self {
        self.bank.entry((difficulty, topic.to_string()))
            .or_default()
            .push(question_id.to_string());
        self
    }

    /// 버킷에 등록된 문제가 없으면 버킷 이름에서 만든 id
    pub fn pick_local(&self, difficulty: Difficulty, topic: &str) -> String {
        self.bank.get(&(difficulty, topic.to_string()))
            .and_then(|ids| ids.choose(&mut rand::thread_rng()).cloned())
            .unwrap_or_else(|| format!(
                "q-{}-{}",
                difficulty.as_str().to_lowercase(),
                topic.to_lowercase().replace(char::is_whitespace, "-"),
            ))
    }
}

#[async_trait]
impl QuestionCatalog for StaticCatalog {
    async fn pick(&self, difficulty: Difficulty, topic: &str) -> MatchResult<String> {
        Ok(self.pick_local(difficulty, topic))
    }
}

// ----------------------------------------------------------------------------
// [HttpCatalog]
// ----------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PickResponse {
    question_id: String,
}

pub struct HttpCatalog {
    client:   reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> MatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MatchError::Catalog(e.to_string()))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl QuestionCatalog for HttpCatalog {
    async fn pick(&self, difficulty: Difficulty, topic: &str) -> MatchResult<String> {
        let mut url = reqwest::Url::parse(&format!("{}/questions/pick", self.base_url))
            .map_err(|e| MatchError::Catalog(format!("bad catalog url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("difficulty", difficulty.as_str())
            .append_pair("topic", topic);

        trace!("[session] catalog GET {}", url);
        let resp = self.client.get(url).send().await
            .map_err(|e| MatchError::Catalog(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MatchError::Catalog(format!("catalog returned {}", resp.status())));
        }
        let body: PickResponse = resp.json().await
            .map_err(|e| MatchError::Catalog(e.to_string()))?;
        Ok(body.question_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_catalog_picks_from_bank() {
        let catalog = StaticCatalog::new()
            .with_question(Difficulty::Easy, "DP", "climbing-stairs")
            .with_question(Difficulty::Easy, "DP", "house-robber");
        let q = catalog.pick(Difficulty::Easy, "DP").await.unwrap();
        assert!(q == "climbing-stairs" || q == "house-robber");
    }

    #[tokio::test]
    async fn static_catalog_derives_id_for_unknown_bucket() {
        let catalog = StaticCatalog::new();
        let q = catalog.pick(Difficulty::Hard, "Dynamic Programming").await.unwrap();
        assert_eq!(q, "q-hard-dynamic-programming");
    }

    #[tokio::test]
    async fn http_catalog_reports_unreachable_service() {
        let port = portpicker::pick_unused_port().expect("no free port");
        let catalog = HttpCatalog::new(&format!("http://127.0.0.1:{}", port), Duration::from_millis(300)).unwrap();
        let err = catalog.pick(Difficulty::Easy, "DP").await.unwrap_err();
        assert!(matches!(err, MatchError::Catalog(_)));
    }
}
