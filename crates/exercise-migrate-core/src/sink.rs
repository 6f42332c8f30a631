use serde::{Deserialize, Serialize};

use crate::ExerciseDocument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    DuplicateKey,
    Failed(String),
}

/// A document collection that accepts one exercise document at a time.
pub trait DocumentSink {
    fn put(&mut self, document: &ExerciseDocument) -> PutOutcome;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadFailure {
    pub document_id: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadSummary {
    pub processed: usize,
    pub inserted: usize,
    pub skipped_duplicates: usize,
    pub failed: usize,
    pub failures: Vec<LoadFailure>,
}

/// Hand every document to the sink in order and tally the outcomes.
///
/// Duplicate keys and other per-document failures are recorded and the
/// load moves on to the next document.
pub fn load_documents<S: DocumentSink + ?Sized>(
    sink: &mut S,
    documents: &[ExerciseDocument],
) -> LoadSummary {
    let mut summary = LoadSummary::default();

    for document in documents {
        summary.processed += 1;
        match sink.put(document) {
            PutOutcome::Inserted => {
                summary.inserted += 1;
                tracing::info!("inserted: {}", document.name);
            }
            PutOutcome::DuplicateKey => {
                summary.skipped_duplicates += 1;
                tracing::info!("skipped (duplicate): {}", document.name);
            }
            PutOutcome::Failed(detail) => {
                summary.failed += 1;
                tracing::warn!("error inserting {}: {detail}", document.name);
                summary.failures.push(LoadFailure { document_id: document.id.clone(), detail });
            }
        }
    }

    tracing::info!(
        "processed {} exercises: {} inserted, {} skipped (duplicates), {} failed",
        summary.processed,
        summary.inserted,
        summary.skipped_duplicates,
        summary.failed
    );

    summary
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, VecDeque};

    use super::*;

    struct ScriptedSink {
        outcomes: VecDeque<PutOutcome>,
        seen: Vec<String>,
    }

    impl DocumentSink for ScriptedSink {
        fn put(&mut self, document: &ExerciseDocument) -> PutOutcome {
            self.seen.push(document.id.clone());
            self.outcomes.pop_front().unwrap_or(PutOutcome::Inserted)
        }
    }

    #[derive(Default)]
    struct UniqueSink {
        ids: BTreeSet<String>,
    }

    impl DocumentSink for UniqueSink {
        fn put(&mut self, document: &ExerciseDocument) -> PutOutcome {
            if self.ids.insert(document.id.clone()) {
                PutOutcome::Inserted
            } else {
                PutOutcome::DuplicateKey
            }
        }
    }

    fn documents(titles: &[&str]) -> Vec<ExerciseDocument> {
        titles
            .iter()
            .map(|title| ExerciseDocument {
                id: (*title).to_string(),
                name: (*title).to_string(),
                demonstration_link: format!("http://x/{title}"),
                muscles: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn one_duplicate_among_five_is_skipped() {
        let mut sink = ScriptedSink {
            outcomes: VecDeque::from([
                PutOutcome::Inserted,
                PutOutcome::Inserted,
                PutOutcome::DuplicateKey,
                PutOutcome::Inserted,
                PutOutcome::Inserted,
            ]),
            seen: Vec::new(),
        };

        let summary = load_documents(&mut sink, &documents(&["a", "b", "c", "d", "e"]));

        assert_eq!(summary.processed, 5);
        assert_eq!(summary.inserted, 4);
        assert_eq!(summary.skipped_duplicates, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(sink.seen, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn other_failures_are_recorded_and_loading_continues() {
        let mut sink = ScriptedSink {
            outcomes: VecDeque::from([
                PutOutcome::Failed("disk full".to_string()),
                PutOutcome::Inserted,
            ]),
            seen: Vec::new(),
        };

        let summary = load_documents(&mut sink, &documents(&["Curl", "Row"]));

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.failures,
            vec![LoadFailure { document_id: "Curl".to_string(), detail: "disk full".to_string() }]
        );
    }

    #[test]
    fn second_load_into_same_sink_skips_everything() {
        let mut sink = UniqueSink::default();
        let docs = documents(&["Curl", "Row", "Press"]);

        let first = load_documents(&mut sink, &docs);
        let second = load_documents(&mut sink, &docs);

        assert_eq!(first.inserted, 3);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_duplicates, 3);
        assert_eq!(second.processed, 3);
    }

    #[test]
    fn sink_behind_trait_object_is_accepted() {
        let mut sink = UniqueSink::default();
        let dynamic: &mut dyn DocumentSink = &mut sink;

        let summary = load_documents(dynamic, &documents(&["Plank"]));

        assert_eq!(summary.inserted, 1);
    }
}
