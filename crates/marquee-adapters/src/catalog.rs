//! Search source backed by a JSON catalog file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures_util::FutureExt;
use marquee_core::{
    CandidateFuture, CandidateId, CandidateResult, SearchProvider, TransferDescriptor,
    parse_size_kb,
};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// One catalog row, shaped like a scraped listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogRow {
    /// Listing title.
    pub title: String,
    /// Seeds advertised by the listing.
    #[serde(default)]
    pub seeds: u32,
    /// Leeches advertised by the listing.
    #[serde(default)]
    pub leeches: u32,
    /// Human size text such as `1.4 GB`.
    #[serde(default)]
    pub size: String,
    /// Link to the listing page.
    #[serde(default)]
    pub link: String,
    /// Magnet-style descriptor.
    #[serde(default)]
    pub magnet: Option<String>,
    /// Listing category.
    #[serde(default)]
    pub category: Option<String>,
}

/// Provider answering queries from a catalog loaded in `init`.
pub struct CatalogProvider {
    name: String,
    path: PathBuf,
    allowed_categories: Arc<Vec<String>>,
    rows: RwLock<Option<Arc<Vec<CatalogRow>>>>,
}

impl CatalogProvider {
    /// Provider reading `path`; categories are compared case-insensitively and an
    /// empty list admits every row.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, allowed: &[String]) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            allowed_categories: Arc::new(
                allowed
                    .iter()
                    .map(|category| category.trim().to_lowercase())
                    .collect(),
            ),
            rows: RwLock::new(None),
        }
    }

    /// Provider over in-memory rows; `init` becomes a no-op.
    #[must_use]
    pub fn from_rows(name: impl Into<String>, rows: Vec<CatalogRow>, allowed: &[String]) -> Self {
        let provider = Self::new(name, PathBuf::new(), allowed);
        Self {
            rows: RwLock::new(Some(Arc::new(rows))),
            ..provider
        }
    }
}

#[async_trait]
impl SearchProvider for CatalogProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<()> {
        if self.rows.read().await.is_some() {
            return Ok(());
        }
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read catalog {}", self.path.display()))?;
        let rows: Vec<CatalogRow> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse catalog {}", self.path.display()))?;
        info!(provider = %self.name, rows = rows.len(), "catalog loaded");
        *self.rows.write().await = Some(Arc::new(rows));
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CandidateFuture>> {
        let Some(rows) = self.rows.read().await.clone() else {
            bail!("catalog {} is not loaded", self.name);
        };
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        let futures: Vec<CandidateFuture> = rows
            .iter()
            .filter(|row| matches_terms(&row.title, &terms))
            .take(limit)
            .cloned()
            .map(|row| {
                let source = self.name.clone();
                let allowed = Arc::clone(&self.allowed_categories);
                async move { Ok::<_, anyhow::Error>(into_candidate(row, &source, &allowed)) }
                    .boxed()
            })
            .collect();
        debug!(provider = %self.name, query, rows = futures.len(), "catalog search");
        Ok(futures)
    }

    async fn close(&self) -> Result<()> {
        if !self.path.as_os_str().is_empty() {
            *self.rows.write().await = None;
        }
        Ok(())
    }
}

fn matches_terms(title: &str, terms: &[String]) -> bool {
    let title = title.to_lowercase();
    terms.iter().all(|term| title.contains(term.as_str()))
}

fn category_allowed(category: Option<&str>, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    category.is_some_and(|category| {
        let category = category.trim().to_lowercase();
        allowed.iter().any(|entry| *entry == category)
    })
}

fn into_candidate(row: CatalogRow, source: &str, allowed: &[String]) -> Option<CandidateResult> {
    if !category_allowed(row.category.as_deref(), allowed) {
        return None;
    }
    Some(CandidateResult {
        id: CandidateId::generate(),
        source: source.to_string(),
        size_kb: parse_size_kb(&row.size),
        title: row.title,
        seeds: row.seeds,
        leeches: row.leeches,
        source_link: row.link,
        descriptor: row
            .magnet
            .map(TransferDescriptor::new)
            .filter(|descriptor| !descriptor.is_blank()),
        category: row.category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;

    fn row(title: &str, category: Option<&str>) -> CatalogRow {
        CatalogRow {
            title: title.to_string(),
            seeds: 40,
            leeches: 2,
            size: "1.4 GB".to_string(),
            link: format!("https://catalog.local/{title}"),
            magnet: Some(format!("magnet:?xt=urn:btih:{title}")),
            category: category.map(ToString::to_string),
        }
    }

    fn allowed() -> Vec<String> {
        vec!["Movies".to_string(), "tv".to_string()]
    }

    #[tokio::test]
    async fn search_filters_terms_and_honours_limit() -> Result<()> {
        let provider = CatalogProvider::from_rows(
            "catalog",
            vec![
                row("Dune Part One", Some("movies")),
                row("Dune Part Two", Some("movies")),
                row("Dune Messiah", Some("movies")),
                row("Arrival", Some("movies")),
            ],
            &allowed(),
        );
        let rows = provider.search("dune", 2).await?;
        assert_eq!(rows.len(), 2);
        let resolved = join_all(rows).await;
        let first = resolved[0]
            .as_ref()
            .map_err(|err| anyhow::anyhow!("{err}"))?
            .clone()
            .ok_or_else(|| anyhow::anyhow!("row filtered"))?;
        assert_eq!(first.title, "Dune Part One");
        assert_eq!(first.size_kb, 1_468_006);
        assert_eq!(first.source, "catalog");
        Ok(())
    }

    #[tokio::test]
    async fn disallowed_categories_resolve_to_none() -> Result<()> {
        let provider = CatalogProvider::from_rows(
            "catalog",
            vec![row("Dune Soundtrack", Some("Software")), row("Dune", None)],
            &allowed(),
        );
        for future in provider.search("dune", 5).await? {
            assert!(future.await?.is_none());
        }
        Ok(())
    }

    #[tokio::test]
    async fn init_loads_file_and_close_releases_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{"title": "Heat", "seeds": 12, "leeches": 1, "size": "700 MB",
                 "link": "https://catalog.local/heat", "magnet": "magnet:?xt=urn:btih:heat",
                 "category": "Movies"}]"#,
        )?;
        let provider = CatalogProvider::new("file", &path, &allowed());
        assert!(provider.search("heat", 5).await.is_err());

        provider.init().await?;
        assert_eq!(provider.search("HEAT", 5).await?.len(), 1);

        provider.close().await?;
        assert!(provider.search("heat", 5).await.is_err());
        Ok(())
    }

    #[test]
    fn empty_allow_list_admits_everything() {
        assert!(category_allowed(None, &[]));
        assert!(!category_allowed(None, &allowed_lower()));
        assert!(category_allowed(Some(" TV "), &allowed_lower()));
    }

    fn allowed_lower() -> Vec<String> {
        vec!["movies".to_string(), "tv".to_string()]
    }
}
