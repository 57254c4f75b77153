use crate::config::CrossColumnPolicy;
use crate::data::Cast;
use crate::notify::{ChangeNotifier, OrderListener, OrderSnapshot, OrderSubscription};
use crate::stacking::StackViews;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

pub const MAX_STACK_SIZE: usize = 3;

/// Up to three answers sharing one answer slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerStack {
    pub id: String,
    pub answers: Vec<Cast>,
}

impl AnswerStack {
    pub(crate) fn from_answers(answers: Vec<Cast>) -> Self {
        Self {
            id: stack_id(&answers),
            answers,
        }
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.answers.len() >= MAX_STACK_SIZE
    }
}

fn stack_id(answers: &[Cast]) -> String {
    let hashes: Vec<&str> = answers.iter().map(|answer| answer.hash.as_str()).collect();
    format!("stack-{}", hashes.join("-"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerEntry {
    Stacked(AnswerStack),
    Single(Cast),
}

impl AnswerEntry {
    pub fn answers(&self) -> &[Cast] {
        match self {
            AnswerEntry::Single(answer) => std::slice::from_ref(answer),
            AnswerEntry::Stacked(stack) => &stack.answers,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            AnswerEntry::Single(answer) => &answer.hash,
            AnswerEntry::Stacked(stack) => &stack.id,
        }
    }

    pub fn is_stacked(&self) -> bool {
        matches!(self, AnswerEntry::Stacked(_))
    }

    pub fn as_single(&self) -> Option<&Cast> {
        match self {
            AnswerEntry::Single(answer) => Some(answer),
            AnswerEntry::Stacked(_) => None,
        }
    }

    pub fn as_stack(&self) -> Option<&AnswerStack> {
        match self {
            AnswerEntry::Stacked(stack) => Some(stack),
            AnswerEntry::Single(_) => None,
        }
    }
}

impl From<Cast> for AnswerEntry {
    fn from(answer: Cast) -> Self {
        AnswerEntry::Single(answer)
    }
}

/// Keeps every stack within `1..=MAX_STACK_SIZE`: empty stacks vanish, a
/// single member collapses to `Single`, overflow members follow as singles.
pub(crate) fn normalize_entries(entries: Vec<AnswerEntry>) -> Vec<AnswerEntry> {
    let mut normalized = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            AnswerEntry::Single(answer) => normalized.push(AnswerEntry::Single(answer)),
            AnswerEntry::Stacked(stack) => {
                let mut answers = stack.answers;
                let overflow = if answers.len() > MAX_STACK_SIZE {
                    warn!(
                        "stack {} has {} answers, splitting after {}",
                        stack.id,
                        answers.len(),
                        MAX_STACK_SIZE
                    );
                    answers.split_off(MAX_STACK_SIZE)
                } else {
                    Vec::new()
                };

                match answers.len() {
                    0 => {}
                    1 => normalized.extend(answers.into_iter().map(AnswerEntry::Single)),
                    _ => normalized.push(AnswerEntry::Stacked(AnswerStack::from_answers(answers))),
                }
                normalized.extend(overflow.into_iter().map(AnswerEntry::Single));
            }
        }
    }
    normalized
}

/// Which list an index refers to. `Pairs` addresses whole rows in paired mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Questions,
    Answers,
    Pairs,
}

/// Why an operation left the board untouched. These are product policy, not
/// failures: nothing is raised and no listener is notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    PermissionDenied,
    NoOpMove,
    MissingDestination,
    OutOfRange,
    StackLimitExceeded,
    AdjacentAlreadyStacked,
    NotAStack,
    IncompatibleColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    Applied,
    Ignored(Ignored),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

/// New column values produced by an operation. `None` leaves that column's
/// allocation untouched.
#[derive(Debug, Default)]
pub(crate) struct Change {
    pub questions: Option<Vec<Cast>>,
    pub answers: Option<Vec<AnswerEntry>>,
}

/// One rendered row: a question and the answer entry at the same index.
#[derive(Debug, Clone, Copy)]
pub struct PairRow<'a> {
    pub index: usize,
    pub question: Option<&'a Cast>,
    pub answer: Option<&'a AnswerEntry>,
}

/// The two parallel columns of an AMA page. Pairing is by index: question `i`
/// belongs with answer entry `i`.
pub struct QaBoard {
    questions: Rc<Vec<Cast>>,
    answers: Rc<Vec<AnswerEntry>>,
    can_edit: bool,
    policy: CrossColumnPolicy,
    notifier: ChangeNotifier,
    pub(crate) views: StackViews,
}

impl QaBoard {
    pub fn new(questions: Vec<Cast>, answers: Vec<Cast>, can_edit: bool) -> Self {
        Self::from_entries(
            questions,
            answers.into_iter().map(AnswerEntry::Single).collect(),
            can_edit,
        )
    }

    pub fn from_entries(questions: Vec<Cast>, answers: Vec<AnswerEntry>, can_edit: bool) -> Self {
        Self {
            questions: Rc::new(questions),
            answers: Rc::new(normalize_entries(answers)),
            can_edit,
            policy: CrossColumnPolicy::default(),
            notifier: ChangeNotifier::new(),
            views: StackViews::default(),
        }
    }

    pub fn with_policy(mut self, policy: CrossColumnPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn questions(&self) -> &[Cast] {
        &self.questions
    }

    pub fn answers(&self) -> &[AnswerEntry] {
        &self.answers
    }

    pub fn question(&self, index: usize) -> Option<&Cast> {
        self.questions.get(index)
    }

    pub fn answer(&self, index: usize) -> Option<&AnswerEntry> {
        self.answers.get(index)
    }

    pub fn can_edit(&self) -> bool {
        self.can_edit
    }

    pub fn policy(&self) -> CrossColumnPolicy {
        self.policy
    }

    pub fn len(&self, column: Column) -> usize {
        match column {
            Column::Questions => self.questions.len(),
            Column::Answers => self.answers.len(),
            Column::Pairs => self.pair_count(),
        }
    }

    /// Rows needed to show both columns side by side.
    pub fn pair_count(&self) -> usize {
        self.questions.len().max(self.answers.len())
    }

    pub fn pairs(&self) -> impl Iterator<Item = PairRow<'_>> + '_ {
        (0..self.pair_count()).map(move |index| PairRow {
            index,
            question: self.questions.get(index),
            answer: self.answers.get(index),
        })
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            questions: Rc::clone(&self.questions),
            answers: Rc::clone(&self.answers),
        }
    }

    pub fn subscribe(&self, listener: OrderListener) -> OrderSubscription {
        self.notifier.subscribe(listener)
    }

    pub(crate) fn ensure_editable(&self) -> Result<(), Ignored> {
        if self.can_edit {
            Ok(())
        } else {
            Err(Ignored::PermissionDenied)
        }
    }

    /// Commits a change and notifies listeners with the committed snapshot.
    /// Both columns are swapped in before any listener runs.
    pub(crate) fn apply(&mut self, operation: &str, change: Result<Change, Ignored>) -> Outcome {
        let change = match change {
            Ok(change) => change,
            Err(reason) => {
                debug!("{} ignored: {:?}", operation, reason);
                return Outcome::Ignored(reason);
            }
        };

        if let Some(questions) = change.questions {
            self.questions = Rc::new(questions);
        }
        if let Some(answers) = change.answers {
            self.answers = Rc::new(answers);
        }
        self.views.prune(&self.answers);

        let snapshot = self.snapshot();
        debug!(
            "{} applied: {} questions, {} answer entries",
            operation,
            snapshot.questions.len(),
            snapshot.answers.len()
        );
        self.notifier.notify(&snapshot);
        Outcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn cast(hash: &str) -> Cast {
        Cast {
            hash: hash.to_owned(),
            ..Default::default()
        }
    }

    fn stack(hashes: &[&str]) -> AnswerEntry {
        AnswerEntry::Stacked(AnswerStack::from_answers(
            hashes.iter().map(|hash| cast(hash)).collect(),
        ))
    }

    #[test]
    fn stack_id_is_derived_from_members() {
        let AnswerEntry::Stacked(stack) = stack(&["a1", "a2"]) else {
            panic!("expected stack");
        };
        assert_eq!(stack.id, "stack-a1-a2");
    }

    #[test]
    fn normalize_collapses_and_splits() {
        let entries = vec![
            stack(&[]),
            stack(&["a1"]),
            stack(&["a2", "a3", "a4", "a5"]),
        ];
        let normalized = normalize_entries(entries);
        let keys: Vec<_> = normalized.iter().map(AnswerEntry::key).collect();
        assert_eq!(keys, vec!["a1", "stack-a2-a3-a4", "a5"]);
    }

    #[test]
    fn untagged_entries_round_trip_through_json() {
        let entries = vec![AnswerEntry::Single(cast("a1")), stack(&["a2", "a3"])];
        let json = serde_json::to_string(&entries).unwrap();
        let decoded: Vec<AnswerEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn pairs_cover_the_longer_column() {
        let board = QaBoard::new(vec![cast("q1"), cast("q2"), cast("q3")], vec![cast("a1")], true);
        let rows: Vec<_> = board
            .pairs()
            .map(|row| (row.question.is_some(), row.answer.is_some()))
            .collect();
        assert_eq!(rows, vec![(true, true), (true, false), (true, false)]);
    }

    #[test]
    fn apply_swaps_both_columns_before_notifying() {
        let mut board = QaBoard::new(vec![cast("q1")], vec![cast("a1")], true);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let _subscription = board.subscribe(Rc::new(move |snapshot: &OrderSnapshot| {
            log.borrow_mut().push((
                snapshot.questions[0].hash.clone(),
                snapshot.answers[0].key().to_owned(),
            ));
        }));

        let outcome = board.apply(
            "replace",
            Ok(Change {
                questions: Some(vec![cast("q9")]),
                answers: Some(vec![AnswerEntry::Single(cast("a9"))]),
            }),
        );

        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(*seen.borrow(), vec![("q9".to_owned(), "a9".to_owned())]);
    }

    #[test]
    fn ignored_change_keeps_allocations() {
        let mut board = QaBoard::new(vec![cast("q1")], vec![cast("a1")], true);
        let before = board.snapshot();
        let outcome = board.apply("noop", Err(Ignored::NoOpMove));
        assert_eq!(outcome, Outcome::Ignored(Ignored::NoOpMove));
        assert!(before.same_questions(&board.snapshot()));
        assert!(before.same_answers(&board.snapshot()));
    }
}
