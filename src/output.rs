//! JSON result sink.
//!
//! Each task writes its result set to the path named by its `output`
//! field: a pretty-printed JSON array of articles, ascending by index.
//! An empty result still writes `[]` — consumers get a schema-stable file
//! for every completed task, never a missing one.

use tokio::fs;
use tracing::{info, instrument};

use crate::error::TaskError;
use crate::models::Article;

/// Serialize `articles` to `path`, creating parent directories as needed.
#[instrument(level = "info", skip(articles), fields(path = %path, count = articles.len()))]
pub async fn write_articles(articles: &[Article], path: &str) -> Result<(), TaskError> {
    let json = serde_json::to_string_pretty(articles).map_err(|e| TaskError::Output {
        path: path.to_string(),
        source: e.into(),
    })?;

    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TaskError::Output {
                    path: path.to_string(),
                    source: e,
                })?;
        }
    }

    fs::write(path, json).await.map_err(|e| TaskError::Output {
        path: path.to_string(),
        source: e,
    })?;
    info!("wrote result file");
    Ok(())
}
