use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ExerciseId, ExerciseSet, MuscleAssociation, RawExerciseRecord};

/// The persisted exercise shape; the title doubles as the document identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExerciseDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub demonstration_link: String,
    pub muscles: Vec<MuscleAssociation>,
}

impl ExerciseDocument {
    #[must_use]
    pub fn from_record(record: RawExerciseRecord) -> Self {
        Self {
            id: record.title.clone(),
            name: record.title,
            demonstration_link: record.link,
            muscles: record.muscles,
        }
    }
}

/// A title that more than one source exercise id mapped to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TitleCollision {
    pub title: String,
    pub kept: ExerciseId,
    pub discarded: Vec<ExerciseId>,
    pub lost_associations: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollapsedCatalog {
    pub documents: Vec<ExerciseDocument>,
    pub collisions: Vec<TitleCollision>,
}

impl CollapsedCatalog {
    #[must_use]
    pub fn discarded_records(&self) -> usize {
        self.collisions.iter().map(|collision| collision.discarded.len()).sum()
    }
}

struct Slot {
    kept: ExerciseId,
    discarded: Vec<ExerciseId>,
    lost_associations: usize,
}

/// Re-key exercise records by title. The last record iterated for a title
/// replaces earlier ones wholesale, associations included; the title keeps
/// the position where it first appeared.
#[must_use]
pub fn collapse_titles(set: ExerciseSet) -> CollapsedCatalog {
    let mut documents: Vec<ExerciseDocument> = Vec::with_capacity(set.len());
    let mut slots: Vec<Slot> = Vec::with_capacity(set.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (id, record) in set {
        let document = ExerciseDocument::from_record(record);
        if let Some(&position) = positions.get(&document.id) {
            let replaced = std::mem::replace(&mut documents[position], document);
            let slot = &mut slots[position];
            slot.discarded.push(slot.kept);
            slot.lost_associations += replaced.muscles.len();
            slot.kept = id;
        } else {
            positions.insert(document.id.clone(), documents.len());
            documents.push(document);
            slots.push(Slot { kept: id, discarded: Vec::new(), lost_associations: 0 });
        }
    }

    let collisions = documents
        .iter()
        .zip(slots)
        .filter(|(_, slot)| !slot.discarded.is_empty())
        .map(|(document, slot)| TitleCollision {
            title: document.id.clone(),
            kept: slot.kept,
            discarded: slot.discarded,
            lost_associations: slot.lost_associations,
        })
        .collect::<Vec<_>>();

    for collision in &collisions {
        tracing::warn!(
            "title {:?} declared by {} exercise ids; kept {}, discarded {} associations",
            collision.title,
            collision.discarded.len() + 1,
            collision.kept,
            collision.lost_associations
        );
    }

    CollapsedCatalog { documents, collisions }
}
