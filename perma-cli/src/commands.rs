use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use perma_base::{BlobRef, ParseTimestampError, Timestamp};
use perma_index::{
    AsOf, Corpus, EnumerateError, JsonLinesLog, Order, OrderKind, SortDirection,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::CliConfig;

/// Query a perma claim log.
///
/// The log is replayed into a fresh in-memory corpus on every invocation.
#[derive(Parser, Debug, Clone)]
#[clap(version, verbatim_doc_comment)]
pub(crate) struct Cli {
    /// Path to the configuration file.
    ///
    /// Defaults to perma.config.toml in $PERMA_CONFIG_DIR or the platform
    /// config directory.
    #[clap(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    #[clap(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct LogArgs {
    /// JSON lines claim log to load.
    #[clap(long)]
    pub(crate) log: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Commands {
    /// Print the values of an attribute, one per line.
    Attr {
        #[clap(flatten)]
        log: LogArgs,
        /// The permanode.
        permanode: BlobRef,
        /// Attribute name.
        attr: String,
        /// Evaluate at this RFC 3339 time instead of the latest state.
        #[clap(long, value_parser = parse_timestamp)]
        at: Option<Timestamp>,
        /// Only consider claims by this signer.
        #[clap(long)]
        signer: Option<BlobRef>,
        /// Print only the first value.
        #[clap(long)]
        first: bool,
    },
    /// List live permanodes.
    List {
        #[clap(flatten)]
        log: LogArgs,
        /// What to sort by.
        #[clap(long, value_enum, default_value_t = ListOrder::Created)]
        by: ListOrder,
        /// Newest first.
        #[clap(long)]
        reverse: bool,
        /// Stop after this many permanodes.
        #[clap(long)]
        limit: Option<usize>,
    },
    /// Print the claims on a permanode as JSON lines.
    Claims {
        #[clap(flatten)]
        log: LogArgs,
        /// The permanode.
        permanode: BlobRef,
        /// Only claims on this attribute.
        #[clap(long)]
        attr: Option<String>,
        /// Only claims by this signer.
        #[clap(long)]
        signer: Option<BlobRef>,
    },
    /// Print statistics about the corpus.
    Stats {
        #[clap(flatten)]
        log: LogArgs,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListOrder {
    /// Creation time.
    Created,
    /// Last modification time.
    Modified,
}

impl From<ListOrder> for OrderKind {
    fn from(value: ListOrder) -> Self {
        match value {
            ListOrder::Created => OrderKind::Created,
            ListOrder::Modified => OrderKind::Modified,
        }
    }
}

fn parse_timestamp(s: &str) -> Result<Timestamp, ParseTimestampError> {
    Timestamp::parse_rfc3339(s)
}

impl Commands {
    fn log(&self) -> &LogArgs {
        match self {
            Commands::Attr { log, .. }
            | Commands::List { log, .. }
            | Commands::Claims { log, .. }
            | Commands::Stats { log } => log,
        }
    }
}

impl Cli {
    pub(crate) async fn run(self) -> Result<()> {
        let config = CliConfig::load(self.config.as_deref()).await?;
        let corpus = Corpus::with_config(config.corpus);
        let log = JsonLinesLog::new(self.command.log().log.clone());
        let stats = tokio::task::spawn_blocking({
            let corpus = corpus.clone();
            move || corpus.replay(&log)
        })
        .await
        .context("replay task failed")??;
        info!(inserted = stats.inserted, skipped = stats.skipped, "claim log loaded");
        self.command.run(&corpus).await
    }
}

impl Commands {
    async fn run(self, corpus: &Corpus) -> Result<()> {
        match self {
            Commands::Attr {
                permanode,
                attr,
                at,
                signer,
                first,
                ..
            } => {
                let at = AsOf::from(at);
                let values = corpus.attr_values(&permanode, &attr, at, signer);
                let shown = if first { 1 } else { values.len() };
                for value in values.iter().take(shown) {
                    println!("{value}");
                }
                Ok(())
            }
            Commands::List {
                by, reverse, limit, ..
            } => {
                let direction = if reverse {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                let order = Order {
                    kind: by.into(),
                    direction,
                };
                let printed = list(corpus, order, limit, std::io::stdout()).await?;
                info!(printed, "listed permanodes");
                Ok(())
            }
            Commands::Claims {
                permanode,
                attr,
                signer,
                ..
            } => {
                for claim in corpus.claims(&permanode, signer, attr.as_deref()) {
                    println!("{}", serde_json::to_string(&*claim)?);
                }
                Ok(())
            }
            Commands::Stats { .. } => {
                println!("{}", serde_json::to_string_pretty(&corpus.stats())?);
                Ok(())
            }
        }
    }
}

/// Stream permanodes to stdout until done, `limit` is reached or ctrl-c.
/// Write live permanodes to `out`, one per line. Returns how many were written.
async fn list(
    corpus: &Corpus,
    order: Order,
    limit: Option<usize>,
    mut out: impl Write,
) -> Result<usize> {
    let cancel = CancellationToken::new();
    let (rx, handle) = corpus.spawn_enumerate(order, cancel.clone());
    let mut printed = 0;
    loop {
        if limit.is_some_and(|limit| printed >= limit) {
            cancel.cancel();
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                break;
            }
            pn = rx.recv_async() => {
                let Ok(pn) = pn else {
                    break;
                };
                writeln!(out, "{pn}")?;
                printed += 1;
            }
        }
    }
    out.flush()?;
    match handle.await? {
        Ok(_) | Err(EnumerateError::Cancelled) => Ok(printed),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_attr_command() {
        let pn = BlobRef::new("pn");
        let pn_str = pn.to_string();
        let cli = Cli::try_parse_from([
            "perma",
            "attr",
            "--log",
            "claims.jsonl",
            pn_str.as_str(),
            "title",
            "--at",
            "2011-04-01T12:00:00Z",
            "--first",
        ])
        .unwrap();
        match cli.command {
            Commands::Attr {
                permanode,
                attr,
                at,
                first,
                signer,
                log,
            } => {
                assert_eq!(permanode, pn);
                assert_eq!(attr, "title");
                assert_eq!(at, Some(Timestamp::parse_rfc3339("2011-04-01T12:00:00Z").unwrap()));
                assert!(first);
                assert!(signer.is_none());
                assert_eq!(log.log, PathBuf::from("claims.jsonl"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_list_defaults() {
        let cli = Cli::try_parse_from(["perma", "list", "--log", "x"]).unwrap();
        match cli.command {
            Commands::List {
                by, reverse, limit, ..
            } => {
                assert_eq!(by, ListOrder::Created);
                assert!(!reverse);
                assert!(limit.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_refs() {
        assert!(Cli::try_parse_from(["perma", "claims", "--log", "x", "nope"]).is_err());
        assert!(Cli::try_parse_from(["perma", "stats"]).is_err());
    }

    #[tokio::test]
    async fn list_respects_limit() {
        use perma_index::Claim;

        let corpus = Corpus::new();
        let signer = BlobRef::new("signer");
        for i in 0..10u64 {
            let pn = BlobRef::new(i.to_le_bytes());
            corpus
                .ingest(Claim::set(signer, Timestamp::from_micros(i), pn, "a", "b"))
                .unwrap();
        }
        let all: Vec<_> = corpus.permanodes(Order::created()).map(|pn| pn.to_string()).collect();

        let mut out = Vec::new();
        assert_eq!(list(&corpus, Order::created(), Some(3), &mut out).await.unwrap(), 3);
        let lines: Vec<_> = String::from_utf8(out).unwrap().lines().map(String::from).collect();
        assert_eq!(lines, all[..3]);

        let mut out = Vec::new();
        assert_eq!(list(&corpus, Order::created(), Some(0), &mut out).await.unwrap(), 0);
        assert!(out.is_empty());

        let mut out = Vec::new();
        assert_eq!(list(&corpus, Order::created(), None, &mut out).await.unwrap(), 10);
        let lines: Vec<_> = String::from_utf8(out).unwrap().lines().map(String::from).collect();
        assert_eq!(lines, all);

        let mut out = Vec::new();
        let reversed = Order::created().reversed();
        assert_eq!(list(&corpus, reversed, Some(20), &mut out).await.unwrap(), 10);
        assert!(String::from_utf8(out).unwrap().starts_with(&all[9]));
    }
}
