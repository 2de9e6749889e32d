use std::sync::{Arc, PoisonError, RwLock};

use super::CorpusSnapshot;

/// Process-wide handle to the corpus queries run against.
///
/// Ingestion builds a complete [`CorpusSnapshot`] off to the side and then [`publish`]es it; the
/// index and store are swapped as one reference. Readers take an `Arc` via [`current`] and keep
/// using that snapshot for the whole query even if a newer one is published meanwhile.
///
/// [`publish`]: ActiveCorpus::publish
/// [`current`]: ActiveCorpus::current
#[derive(Default)]
pub struct ActiveCorpus {
    snapshot: RwLock<Option<Arc<CorpusSnapshot>>>,
}

impl ActiveCorpus {
    /// Create an empty handle; queries fail until something is published.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active snapshot, returning the previous one.
    pub fn publish(&self, snapshot: Arc<CorpusSnapshot>) -> Option<Arc<CorpusSnapshot>> {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.replace(snapshot)
    }

    /// Snapshot in effect right now.
    pub fn current(&self) -> Option<Arc<CorpusSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FlatIpIndex, MetadataStore};
    use crate::processing::Chunk;

    fn snapshot_of(size: usize, label: &str) -> Arc<CorpusSnapshot> {
        let vectors: Vec<Vec<f32>> = (0..size).map(|_| vec![1.0, 0.0]).collect();
        let corpus = (0..size)
            .map(|window| Chunk {
                page_number: 1,
                chunk_id: format!("p1_c{window}"),
                text: label.to_string(),
            })
            .collect();
        let index = FlatIpIndex::build(2, &vectors).expect("index");
        let store = MetadataStore::new(label, 2, corpus);
        Arc::new(CorpusSnapshot::new(index, store).expect("snapshot"))
    }

    #[test]
    fn publish_replaces_whole_snapshot() {
        let active = ActiveCorpus::new();
        assert!(active.current().is_none());

        assert!(active.publish(snapshot_of(2, "old")).is_none());
        let previous = active.publish(snapshot_of(5, "new")).expect("previous");
        assert_eq!(previous.len(), 2);

        let current = active.current().expect("current");
        assert_eq!(current.len(), 5);
        assert_eq!(current.embedding_model(), Some("new"));
    }

    #[test]
    fn readers_never_observe_mixed_pairs() {
        let active = Arc::new(ActiveCorpus::new());
        active.publish(snapshot_of(1, "one"));

        let writer = {
            let active = Arc::clone(&active);
            std::thread::spawn(move || {
                for round in 0..200 {
                    let size = 1 + round % 7;
                    active.publish(snapshot_of(size, &format!("v{size}")));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let active = Arc::clone(&active);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = active.current().expect("snapshot");
                        assert_eq!(snapshot.index().len(), snapshot.store().len());
                        let label = snapshot.store().corpus[0].text.clone();
                        assert!(label == "one" || label == format!("v{}", snapshot.len()));
                    }
                })
            })
            .collect();

        writer.join().expect("writer");
        for reader in readers {
            reader.join().expect("reader");
        }
    }
}
