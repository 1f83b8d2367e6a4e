//! Manual-drop adapter
//!
//! Reads pre-downloaded CSV files from a local directory instead of the
//! network. This is the end of every fallback chain: when all automated
//! sources fail, an operator downloads the file by hand (IDX website,
//! Yahoo history page, Stooq) and drops it as `{CODE}_<anything>.csv`,
//! e.g. `BBCA_manual.csv`.

use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::traits::{FetchRequest, RawPayload, SourceAdapter, SourceError, SourceKind, SourceResult};
use crate::schema::Dialect;

/// Filesystem manual-drop adapter
pub struct ManualDropAdapter {
    directory: PathBuf,
}

impl ManualDropAdapter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Find the dropped file for a ticker: `{CODE}_*.csv`, newest
    /// modification time wins when several match.
    async fn locate(&self, request: &FetchRequest) -> SourceResult<PathBuf> {
        let ticker = request.ticker.as_str();
        let prefix = format!("{}_", request.ticker.code().to_uppercase());

        let mut entries = tokio::fs::read_dir(&self.directory).await.map_err(|e| {
            SourceError::NotFound(format!(
                "{ticker}: manual drop directory {} is unreadable: {e}",
                self.directory.display()
            ))
        })?;

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(SourceError::Unavailable(format!(
                        "{ticker}: reading manual drop directory: {e}"
                    )))
                }
            };
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_uppercase(),
                None => continue,
            };
            if !name.starts_with(&prefix) || !name.ends_with(".CSV") {
                continue;
            }

            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            match &newest {
                Some((best, _)) if *best >= modified => {}
                _ => newest = Some((modified, path)),
            }
        }

        newest.map(|(_, path)| path).ok_or_else(|| {
            SourceError::NotFound(format!(
                "{ticker}: no {prefix}*.csv file in {}",
                self.directory.display()
            ))
        })
    }
}

#[async_trait]
impl SourceAdapter for ManualDropAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::ManualDrop
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        _shutdown: broadcast::Receiver<()>,
    ) -> SourceResult<RawPayload> {
        let ticker = request.ticker.as_str();
        let path = self.locate(request).await?;
        debug!(%ticker, path = %path.display(), "loading manual drop file");

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            SourceError::Unavailable(format!("{ticker}: reading {}: {e}", path.display()))
        })?;

        if bytes.is_empty() {
            return Err(SourceError::NoData(format!(
                "{ticker}: {} is empty",
                path.display()
            )));
        }

        // Operators drop files from several sites; let the normalizer
        // detect the dialect from the header.
        Ok(RawPayload::new(
            SourceKind::ManualDrop,
            Dialect::Unknown,
            bytes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{DateRange, TickerSymbol};
    use chrono::NaiveDate;

    fn request(ticker: &str) -> FetchRequest {
        FetchRequest::new(
            TickerSymbol::parse(ticker).unwrap(),
            DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn loads_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let content = "Date,Open,High,Low,Close,Volume\n2024-01-02,100,110,95,105,5000\n";
        std::fs::write(dir.path().join("BBCA_manual.csv"), content).unwrap();
        std::fs::write(dir.path().join("GOTO_manual.csv"), "other").unwrap();

        let adapter = ManualDropAdapter::new(dir.path());
        let (_tx, rx) = broadcast::channel(1);

        let payload = adapter.fetch(&request("BBCA.JK"), rx).await.unwrap();
        assert_eq!(payload.source, SourceKind::ManualDrop);
        assert_eq!(payload.dialect, Dialect::Unknown);
        assert_eq!(payload.bytes, content.as_bytes());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = ManualDropAdapter::new(dir.path());
        let (_tx, rx) = broadcast::channel(1);

        let result = adapter.fetch(&request("TLKM.JK"), rx).await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn empty_file_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("BUMI_idx.csv"), "").unwrap();

        let adapter = ManualDropAdapter::new(dir.path());
        let (_tx, rx) = broadcast::channel(1);

        let result = adapter.fetch(&request("BUMI.JK"), rx).await;
        assert!(matches!(result, Err(SourceError::NoData(_))));
    }

    #[tokio::test]
    async fn case_insensitive_filename_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bbca_stooq.csv"),
            "Date,Open,High,Low,Close,Volume\n2024-01-02,1,2,0.5,1,10\n",
        )
        .unwrap();

        let adapter = ManualDropAdapter::new(dir.path());
        let (_tx, rx) = broadcast::channel(1);

        assert!(adapter.fetch(&request("BBCA.JK"), rx).await.is_ok());
    }
}
