//! Claim logs the corpus is loaded from.

use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Lines, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    claim::Claim,
    corpus::{Corpus, IngestOutcome, LoadStats},
};

/// A store able to yield every claim it holds.
pub trait ClaimSource {
    /// Iterator over the claims in the source.
    type Iter<'a>: Iterator<Item = Result<Claim>>
    where
        Self: 'a;

    /// Iterate over all claims, in storage order.
    fn claims(&self) -> Result<Self::Iter<'_>>;
}

/// In-memory append-only claim log.
///
/// Subscribers are notified of every appended claim.
#[derive(Debug, Clone, Default)]
pub struct MemClaimLog {
    inner: Arc<RwLock<MemClaimLogInner>>,
}

#[derive(Debug, Default)]
struct MemClaimLogInner {
    claims: Vec<Claim>,
    subscribers: Vec<flume::Sender<Claim>>,
}

impl MemClaimLog {
    /// Append a claim and notify subscribers.
    pub fn append(&self, claim: Claim) {
        let mut inner = self.inner.write();
        inner
            .subscribers
            .retain(|sub| sub.send(claim.clone()).is_ok());
        inner.claims.push(claim);
    }

    /// Receive every claim appended from now on.
    pub fn subscribe(&self) -> flume::Receiver<Claim> {
        let (tx, rx) = flume::unbounded();
        self.inner.write().subscribers.push(tx);
        rx
    }

    /// Number of claims in the log.
    pub fn len(&self) -> usize {
        self.inner.read().claims.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClaimSource for MemClaimLog {
    type Iter<'a> = std::vec::IntoIter<Result<Claim>>;

    fn claims(&self) -> Result<Self::Iter<'_>> {
        Ok(self
            .inner
            .read()
            .claims
            .iter()
            .cloned()
            .map(Ok)
            .collect::<Vec<_>>()
            .into_iter())
    }
}

/// A file with one JSON encoded claim per line.
#[derive(Debug, Clone)]
pub struct JsonLinesLog {
    path: PathBuf,
}

impl JsonLinesLog {
    /// Use the log at `path`. The file is opened when read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a claim, creating the file if needed.
    pub fn append(&self, claim: &Claim) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let mut line = serde_json::to_vec(claim)?;
        line.push(b'\n');
        file.write_all(&line)?;
        Ok(())
    }
}

/// Iterator over the claims of a [`JsonLinesLog`].
#[derive(Debug)]
pub struct JsonLinesIter {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl Iterator for JsonLinesIter {
    type Item = Result<Claim>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            let line_no = self.line_no;
            return Some(
                serde_json::from_str(&line)
                    .with_context(|| format!("invalid claim on line {line_no}")),
            );
        }
    }
}

impl ClaimSource for JsonLinesLog {
    type Iter<'a> = JsonLinesIter;

    fn claims(&self) -> Result<Self::Iter<'_>> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        Ok(JsonLinesIter {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

impl Corpus {
    /// Load every claim of `source` through [`Corpus::ingest_batch`].
    ///
    /// Fails without touching the corpus if the source cannot be read.
    pub fn replay(&self, source: &impl ClaimSource) -> Result<LoadStats> {
        let claims = source.claims()?.collect::<Result<Vec<_>>>()?;
        debug!(len = claims.len(), "replaying claim log");
        Ok(self.ingest_batch(claims))
    }

    /// Ingest claims from `rx` until it closes or `cancel` fires.
    ///
    /// Returns the number of claims inserted.
    pub async fn ingest_live(
        &self,
        rx: flume::Receiver<Claim>,
        cancel: CancellationToken,
    ) -> usize {
        let mut inserted = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                claim = rx.recv_async() => {
                    let Ok(claim) = claim else {
                        break;
                    };
                    match self.ingest(claim) {
                        Ok(IngestOutcome::Inserted) => inserted += 1,
                        Ok(IngestOutcome::Duplicate) => {}
                        Err(err) => warn!(%err, "dropping live claim"),
                    }
                }
            }
        }
        debug!(inserted, "live ingestion stopped");
        inserted
    }
}
