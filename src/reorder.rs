use crate::config::CrossColumnPolicy;
use crate::entries::{AnswerEntry, Change, Column, Ignored, Outcome, QaBoard};

/// A position in one of the board's lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub column: Column,
    pub index: usize,
}

impl Slot {
    pub fn new(column: Column, index: usize) -> Self {
        Self { column, index }
    }
}

/// A finished drag, independent of whatever produced it. `destination` is
/// `None` when the pointer was released outside every drop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragGesture {
    pub source: Slot,
    pub destination: Option<Slot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Question,
    Answer,
    Pair,
}

impl MoveKind {
    pub fn column(self) -> Column {
        match self {
            MoveKind::Question => Column::Questions,
            MoveKind::Answer => Column::Answers,
            MoveKind::Pair => Column::Pairs,
        }
    }
}

impl QaBoard {
    /// Removes the element at `from` and reinserts it at `to` in the same
    /// list. `to` is used as-is after the removal, so moving 0 to 2 in
    /// `[a, b, c]` gives `[b, c, a]`.
    pub fn move_within(&mut self, column: Column, from: usize, to: usize) -> Outcome {
        let change = self
            .ensure_editable()
            .and_then(|_| self.plan_within(column, from, to));
        self.apply("move_within", change)
    }

    /// Moves an element between the question and answer columns according to
    /// the board's [`CrossColumnPolicy`].
    pub fn move_across(
        &mut self,
        from_column: Column,
        from: usize,
        to_column: Column,
        to: usize,
    ) -> Outcome {
        let change = self
            .ensure_editable()
            .and_then(|_| self.plan_across(from_column, from, to_column, to));
        self.apply("move_across", change)
    }

    /// Moves question `from` and answer entry `from` together, so the pair
    /// stays aligned. Column lengths never change. When the columns differ in
    /// length, a complete row can only move to another complete row and a
    /// row missing one side only within the trailing one-sided rows.
    pub fn move_pair(&mut self, from: usize, to: usize) -> Outcome {
        let change = self.ensure_editable().and_then(|_| self.plan_pair(from, to));
        self.apply("move_pair", change)
    }

    /// Position-picker move. Indices are 0-based; the picker itself shows
    /// `1..=N` (see [`QaBoard::position_choices`]).
    pub fn quick_move(&mut self, kind: MoveKind, from: usize, to: usize) -> Outcome {
        self.move_within(kind.column(), from, to)
    }

    pub fn position_choices(&self, kind: MoveKind) -> Vec<usize> {
        (1..=self.len(kind.column())).collect()
    }

    /// Dropping on the slot just past the end of the source's own column
    /// moves the element to the last position.
    pub fn apply_drag(&mut self, gesture: &DragGesture) -> Outcome {
        let change = self.ensure_editable().and_then(|_| {
            let destination = gesture.destination.ok_or(Ignored::MissingDestination)?;
            let mut to = destination.index;
            if destination.column == gesture.source.column && to == self.len(destination.column) {
                to = to.saturating_sub(1);
            }
            self.plan_across(
                gesture.source.column,
                gesture.source.index,
                destination.column,
                to,
            )
        });
        self.apply("drag", change)
    }

    fn plan_within(&self, column: Column, from: usize, to: usize) -> Result<Change, Ignored> {
        if from == to {
            return Err(Ignored::NoOpMove);
        }

        match column {
            Column::Questions => Ok(Change {
                questions: Some(splice_move(self.questions(), from, to)?),
                answers: None,
            }),
            Column::Answers => Ok(Change {
                questions: None,
                answers: Some(splice_move(self.answers(), from, to)?),
            }),
            Column::Pairs => self.plan_pair(from, to),
        }
    }

    fn plan_pair(&self, from: usize, to: usize) -> Result<Change, Ignored> {
        if from == to {
            return Err(Ignored::NoOpMove);
        }

        let questions = self.questions();
        let answers = self.answers();
        if from >= self.pair_count() || to >= self.pair_count() {
            return Err(Ignored::OutOfRange);
        }

        // Complete rows stay among complete rows and the one-sided tail stays
        // in the tail, so every pair keeps its partner.
        let complete = questions.len().min(answers.len());
        if (from < complete) != (to < complete) {
            return Err(Ignored::OutOfRange);
        }

        let questions = if from < questions.len() {
            Some(splice_move(questions, from, to)?)
        } else {
            None
        };
        let answers = if from < answers.len() {
            Some(splice_move(answers, from, to)?)
        } else {
            None
        };
        Ok(Change { questions, answers })
    }

    fn plan_across(
        &self,
        from_column: Column,
        from: usize,
        to_column: Column,
        to: usize,
    ) -> Result<Change, Ignored> {
        match (from_column, to_column) {
            (source, destination) if source == destination => self.plan_within(source, from, to),
            (Column::Questions, Column::Answers) => {
                let (questions, answers) = cross_move(
                    self.questions(),
                    from,
                    self.answers(),
                    to,
                    self.policy(),
                    |question| Some(AnswerEntry::Single(question.clone())),
                    |entry| entry.as_single().cloned(),
                )?;
                Ok(Change {
                    questions: Some(questions),
                    answers: Some(answers),
                })
            }
            (Column::Answers, Column::Questions) => {
                let (answers, questions) = cross_move(
                    self.answers(),
                    from,
                    self.questions(),
                    to,
                    self.policy(),
                    |entry| entry.as_single().cloned(),
                    |question| Some(AnswerEntry::Single(question.clone())),
                )?;
                Ok(Change {
                    questions: Some(questions),
                    answers: Some(answers),
                })
            }
            _ => Err(Ignored::IncompatibleColumn),
        }
    }
}

fn splice_move<T: Clone>(items: &[T], from: usize, to: usize) -> Result<Vec<T>, Ignored> {
    if from >= items.len() || to >= items.len() {
        return Err(Ignored::OutOfRange);
    }
    let mut items = items.to_vec();
    let moved = items.remove(from);
    items.insert(to, moved);
    Ok(items)
}

fn cross_move<S: Clone, D: Clone>(
    source: &[S],
    from: usize,
    destination: &[D],
    to: usize,
    policy: CrossColumnPolicy,
    into_destination: impl Fn(&S) -> Option<D>,
    into_source: impl Fn(&D) -> Option<S>,
) -> Result<(Vec<S>, Vec<D>), Ignored> {
    let moving = source.get(from).ok_or(Ignored::OutOfRange)?;
    if to > destination.len() {
        return Err(Ignored::OutOfRange);
    }
    let moved = into_destination(moving).ok_or(Ignored::IncompatibleColumn)?;

    let mut source = source.to_vec();
    let mut destination = destination.to_vec();

    match policy {
        CrossColumnPolicy::Swap if to < destination.len() => {
            let displaced = into_source(&destination[to]).ok_or(Ignored::IncompatibleColumn)?;
            source[from] = displaced;
            destination[to] = moved;
        }
        // Swapping onto the slot past the end has no occupant to send back.
        CrossColumnPolicy::Swap | CrossColumnPolicy::Relocate => {
            source.remove(from);
            destination.insert(to, moved);
        }
    }

    Ok((source, destination))
}
