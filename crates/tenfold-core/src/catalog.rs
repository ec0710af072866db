//! Question catalog and selection policy.
//!
//! Selection is uniform over the candidate set. Exclusions are a preference,
//! not a requirement: when they would leave nothing to choose from, the pick
//! degrades to a wider pool instead of failing.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{CoreError, Result};
use crate::model::Question;
use crate::storage::Database;

/// Prompts inserted into an empty catalog.
pub const DEFAULT_QUESTIONS: &[&str] = &[
    "How else could you use a paperclip?",
    "What could a city do with empty parking lots at night?",
    "How would you explain snow to someone who has never seen it?",
    "What new sport could be played in a swimming pool?",
    "What would you put in a museum of everyday life?",
    "How could a library attract teenagers?",
    "What could you build from a hundred cardboard boxes?",
    "How might people greet each other in a hundred years?",
    "What would change if nobody could lie?",
    "How could a morning commute become enjoyable?",
    "What are unusual uses for an old umbrella?",
    "What would a restaurant for cats serve?",
    "How could a neighbourhood reduce loneliness?",
    "What holiday is missing from the calendar?",
    "What could replace the doorbell?",
    "How would you redesign the shopping cart?",
    "What problems could a pocket-sized robot solve?",
    "How could school be more like a game?",
    "What could you learn from watching ants?",
    "What would a silent concert look like?",
    "How could one tree be useful to a whole street?",
    "What stories could a lost sock tell?",
    "How would you make waiting in line fun?",
    "What could an elevator do besides move people?",
];

/// Pick uniformly among `ids` not in `exclude`; if that leaves nothing,
/// pick among all `ids`.
pub fn pick_random<R: Rng + ?Sized>(
    ids: &[i64],
    exclude: &HashSet<i64>,
    rng: &mut R,
) -> Option<i64> {
    let candidates: Vec<i64> = ids.iter().copied().filter(|id| !exclude.contains(id)).collect();
    candidates
        .choose(rng)
        .or_else(|| ids.choose(rng))
        .copied()
}

/// Like [`pick_random`], but `current` is never returned. When `exclude`
/// leaves nothing, falls back to any id other than `current`.
pub fn pick_random_except<R: Rng + ?Sized>(
    ids: &[i64],
    current: i64,
    exclude: &HashSet<i64>,
    rng: &mut R,
) -> Option<i64> {
    let preferred: Vec<i64> = ids
        .iter()
        .copied()
        .filter(|id| *id != current && !exclude.contains(id))
        .collect();
    if let Some(id) = preferred.choose(rng) {
        return Some(*id);
    }
    let others: Vec<i64> = ids.iter().copied().filter(|id| *id != current).collect();
    others.choose(rng).copied()
}

/// Store-backed selection for a particular user.
pub struct QuestionCatalog<'a> {
    db: &'a Database,
}

impl<'a> QuestionCatalog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// A question for daily issuance or bonus practice, preferring ones the
    /// user has not completed yet.
    pub fn pick_for_user<R: Rng + ?Sized>(&self, user_id: i64, rng: &mut R) -> Result<Question> {
        let ids = self.db.question_ids()?;
        let completed = self.db.completed_question_ids(user_id)?;
        let id = pick_random(&ids, &completed, rng)
            .ok_or_else(|| CoreError::not_found("question", "any"))?;
        self.load(id)
    }

    /// A replacement for `current`, preferring questions the user has not
    /// completed yet.
    pub fn pick_replacement<R: Rng + ?Sized>(
        &self,
        user_id: i64,
        current: i64,
        rng: &mut R,
    ) -> Result<Question> {
        let ids = self.db.question_ids()?;
        let completed = self.db.completed_question_ids(user_id)?;
        let id = pick_random_except(&ids, current, &completed, rng)
            .ok_or_else(|| CoreError::not_found("question", format!("other than {current}")))?;
        self.load(id)
    }

    fn load(&self, id: i64) -> Result<Question> {
        self.db
            .get_question(id)?
            .ok_or_else(|| CoreError::not_found("question", id))
    }
}
