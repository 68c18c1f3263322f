//! Streaming enumeration of live permanodes.

use std::{sync::Arc, time::Duration};

use perma_base::BlobRef;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{corpus::Corpus, error::EnumerateError, sorted::Order};

/// How often a blocking enumeration checks for cancellation while the
/// receiver is full.
const BLOCKING_POLL: Duration = Duration::from_millis(20);

/// Iterator over a snapshot of live permanodes.
///
/// The snapshot is taken when the iterator is created and is not affected
/// by later ingestion.
#[derive(Debug, Clone)]
pub struct PermanodeIter {
    items: Arc<[BlobRef]>,
    pos: usize,
}

impl PermanodeIter {
    /// The whole snapshot, including items already yielded.
    pub fn snapshot(&self) -> &[BlobRef] {
        &self.items
    }
}

impl Iterator for PermanodeIter {
    type Item = BlobRef;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.get(self.pos).copied()?;
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.items.len() - self.pos;
        (n, Some(n))
    }
}

impl ExactSizeIterator for PermanodeIter {}

impl Corpus {
    /// Live permanodes in `order`.
    pub fn permanodes(&self, order: Order) -> PermanodeIter {
        PermanodeIter {
            items: self.sorted(order),
            pos: 0,
        }
    }

    /// Send the live permanodes in `order` to `tx`.
    ///
    /// The corpus lock is released before the first send. Returns the
    /// number of refs sent once all are delivered.
    pub async fn enumerate(
        &self,
        order: Order,
        tx: flume::Sender<BlobRef>,
        cancel: CancellationToken,
    ) -> Result<usize, EnumerateError> {
        self.metrics().enumerations.inc();
        let items = self.sorted(order);
        for (i, pn) in items.iter().enumerate() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.metrics().enumerations_cancelled.inc();
                    debug!(sent = i, total = items.len(), "enumeration cancelled");
                    return Err(EnumerateError::Cancelled);
                }
                res = tx.send_async(*pn) => {
                    res.map_err(|_| EnumerateError::ReceiverDropped)?;
                }
            }
        }
        Ok(items.len())
    }

    /// Blocking version of [`Self::enumerate`] for use outside a runtime.
    pub fn enumerate_blocking(
        &self,
        order: Order,
        tx: flume::Sender<BlobRef>,
        cancel: CancellationToken,
    ) -> Result<usize, EnumerateError> {
        self.metrics().enumerations.inc();
        let items = self.sorted(order);
        for (i, pn) in items.iter().enumerate() {
            loop {
                if cancel.is_cancelled() {
                    self.metrics().enumerations_cancelled.inc();
                    debug!(sent = i, total = items.len(), "enumeration cancelled");
                    return Err(EnumerateError::Cancelled);
                }
                match tx.send_timeout(*pn, BLOCKING_POLL) {
                    Ok(()) => break,
                    Err(flume::SendTimeoutError::Timeout(_)) => continue,
                    Err(flume::SendTimeoutError::Disconnected(_)) => {
                        return Err(EnumerateError::ReceiverDropped)
                    }
                }
            }
        }
        Ok(items.len())
    }

    /// Run [`Self::enumerate`] on a tokio task, feeding a channel bounded by
    /// the configured stream capacity.
    pub fn spawn_enumerate(
        &self,
        order: Order,
        cancel: CancellationToken,
    ) -> (
        flume::Receiver<BlobRef>,
        JoinHandle<Result<usize, EnumerateError>>,
    ) {
        let (tx, rx) = flume::bounded(self.config().stream_capacity.max(1));
        let this = self.clone();
        let handle = tokio::spawn(async move { this.enumerate(order, tx, cancel).await });
        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use perma_base::Timestamp;

    use super::*;
    use crate::{claim::Claim, config::CorpusConfig};

    fn corpus_with(n: u64) -> (Corpus, Vec<BlobRef>) {
        let corpus = Corpus::new();
        let signer = BlobRef::new("signer");
        let pns: Vec<_> = (0..n).map(|i| BlobRef::new(i.to_le_bytes())).collect();
        for (i, pn) in pns.iter().enumerate() {
            let claim = Claim::set(signer, Timestamp::from_micros(i as u64), *pn, "title", "x");
            corpus.ingest(claim).unwrap();
        }
        (corpus, pns)
    }

    #[test]
    fn iter_is_a_snapshot() {
        let (corpus, pns) = corpus_with(3);
        let mut iter = corpus.permanodes(Order::created());
        assert_eq!(iter.len(), 3);
        assert_eq!(iter.next(), Some(pns[0]));
        assert_eq!(iter.len(), 2);
        let late = BlobRef::new("late");
        corpus
            .ingest(Claim::set(BlobRef::new("s"), Timestamp::from_micros(99), late, "a", "b"))
            .unwrap();
        assert_eq!(iter.snapshot(), &pns[..]);
        assert_eq!(iter.collect::<Vec<_>>(), pns[1..].to_vec());
        assert_eq!(corpus.permanodes(Order::created()).len(), 4);
    }

    #[tokio::test]
    async fn enumerate_in_order() {
        let (corpus, mut pns) = corpus_with(10);
        let (tx, rx) = flume::unbounded();
        let n = corpus
            .enumerate(Order::created().reversed(), tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(n, 10);
        pns.reverse();
        assert_eq!(rx.drain().collect::<Vec<_>>(), pns);
    }

    #[tokio::test]
    async fn enumerate_cancelled() {
        let (corpus, pns) = corpus_with(10);
        let (tx, rx) = flume::bounded(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let corpus = corpus.clone();
            let cancel = cancel.clone();
            async move { corpus.enumerate(Order::created(), tx, cancel).await }
        });
        assert_eq!(rx.recv_async().await.unwrap(), pns[0]);
        cancel.cancel();
        assert_eq!(task.await.unwrap(), Err(EnumerateError::Cancelled));
        assert_eq!(corpus.metrics().enumerations_cancelled.get(), 1);
    }

    #[tokio::test]
    async fn enumerate_receiver_dropped() {
        let (corpus, _) = corpus_with(3);
        let (tx, rx) = flume::bounded(1);
        drop(rx);
        let res = corpus
            .enumerate(Order::created(), tx, CancellationToken::new())
            .await;
        assert_eq!(res, Err(EnumerateError::ReceiverDropped));
    }

    #[tokio::test]
    async fn spawn_enumerate_stream() {
        let config = CorpusConfig {
            stream_capacity: 2,
            ..Default::default()
        };
        let corpus = Corpus::with_config(config);
        let signer = BlobRef::new("signer");
        for i in 0..5u64 {
            let pn = BlobRef::new(i.to_le_bytes());
            corpus
                .ingest(Claim::set(signer, Timestamp::from_micros(i), pn, "a", "b"))
                .unwrap();
        }
        let order = Order::recently_modified();
        let (rx, handle) = corpus.spawn_enumerate(order, CancellationToken::new());
        let mut got = Vec::new();
        while let Ok(pn) = rx.recv_async().await {
            got.push(pn);
        }
        assert_eq!(handle.await.unwrap(), Ok(5));
        assert_eq!(got, corpus.permanodes(order).collect::<Vec<_>>());
    }

    #[test]
    fn blocking_cancel_and_drop() {
        let (corpus, pns) = corpus_with(5);
        let (tx, rx) = flume::bounded(1);
        let cancel = CancellationToken::new();
        let handle = std::thread::spawn({
            let corpus = corpus.clone();
            let cancel = cancel.clone();
            move || corpus.enumerate_blocking(Order::created(), tx, cancel)
        });
        assert_eq!(rx.recv().unwrap(), pns[0]);
        cancel.cancel();
        assert_eq!(handle.join().unwrap(), Err(EnumerateError::Cancelled));

        let (tx, rx) = flume::unbounded();
        let n = corpus
            .enumerate_blocking(Order::created(), tx, CancellationToken::new())
            .unwrap();
        assert_eq!(n, 5);
        assert_eq!(rx.drain().collect::<Vec<_>>(), pns);

        let (tx, rx) = flume::bounded(0);
        drop(rx);
        assert_eq!(
            corpus.enumerate_blocking(Order::created(), tx, CancellationToken::new()),
            Err(EnumerateError::ReceiverDropped)
        );
    }
}
