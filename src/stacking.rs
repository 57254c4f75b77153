use crate::data::Cast;
use crate::entries::{AnswerEntry, AnswerStack, Change, Ignored, Outcome, QaBoard};
use std::collections::HashMap;

/// Which member of each stack is currently on screen. Pure view state: it
/// never touches the columns and never notifies.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StackViews {
    displayed: HashMap<String, usize>,
}

impl StackViews {
    pub fn displayed_index(&self, stack: &AnswerStack) -> usize {
        let last = stack.len().saturating_sub(1);
        self.displayed.get(&stack.id).copied().unwrap_or(0).min(last)
    }

    fn set(&mut self, stack: &AnswerStack, index: usize) -> bool {
        let clamped = index.min(stack.len().saturating_sub(1));
        let changed = self.displayed_index(stack) != clamped;
        self.displayed.insert(stack.id.clone(), clamped);
        changed
    }

    pub(crate) fn prune(&mut self, answers: &[AnswerEntry]) {
        self.displayed.retain(|id, _| {
            answers
                .iter()
                .any(|entry| entry.as_stack().map_or(false, |stack| &stack.id == id))
        });
    }
}

impl QaBoard {
    /// Merges answer entry `index + 1` into entry `index`. Two singles become
    /// a new stack; a stack with room takes the next single as its last
    /// member. The answer column shrinks by one.
    pub fn stack(&mut self, index: usize) -> Outcome {
        let change = self.ensure_editable().and_then(|_| self.plan_stack(index));
        self.apply("stack", change)
    }

    /// Pulls one member out of a stack and places it right after the stack.
    /// A two-member stack dissolves back into its members in stack order.
    pub fn unstack(&mut self, stack_index: usize, answer_index: usize) -> Outcome {
        let change = self
            .ensure_editable()
            .and_then(|_| self.plan_unstack(stack_index, answer_index));
        self.apply("unstack", change)
    }

    /// Shows member `display_index` of the stack with `stack_id`, clamped to
    /// the stack's bounds. Returns whether the displayed member changed.
    pub fn navigate(&mut self, stack_id: &str, display_index: usize) -> bool {
        let Some(stack) = self
            .answers()
            .iter()
            .filter_map(AnswerEntry::as_stack)
            .find(|stack| stack.id == stack_id)
            .cloned()
        else {
            return false;
        };
        self.views.set(&stack, display_index)
    }

    pub fn displayed_index(&self, stack: &AnswerStack) -> usize {
        self.views.displayed_index(stack)
    }

    /// The answer currently shown for `entry`. `None` only for a stack with
    /// no members, which the board never builds but a caller can.
    pub fn displayed_answer<'a>(&self, entry: &'a AnswerEntry) -> Option<&'a Cast> {
        match entry {
            AnswerEntry::Single(answer) => Some(answer),
            AnswerEntry::Stacked(stack) => stack.answers.get(self.views.displayed_index(stack)),
        }
    }

    pub fn can_stack(&self, index: usize) -> bool {
        self.can_edit() && self.plan_stack(index).is_ok()
    }

    fn plan_stack(&self, index: usize) -> Result<Change, Ignored> {
        let answers = self.answers();
        let (Some(current), Some(next)) = (
            answers.get(index),
            index.checked_add(1).and_then(|next| answers.get(next)),
        ) else {
            return Err(Ignored::OutOfRange);
        };

        let AnswerEntry::Single(next) = next else {
            return Err(Ignored::AdjacentAlreadyStacked);
        };

        let members = match current {
            AnswerEntry::Stacked(stack) if stack.is_full() => {
                return Err(Ignored::StackLimitExceeded);
            }
            AnswerEntry::Stacked(stack) => {
                let mut members = stack.answers.clone();
                members.push(next.clone());
                members
            }
            AnswerEntry::Single(answer) => vec![answer.clone(), next.clone()],
        };

        let mut updated = answers.to_vec();
        updated.splice(
            index..=index + 1,
            [AnswerEntry::Stacked(AnswerStack::from_answers(members))],
        );

        Ok(Change {
            questions: None,
            answers: Some(updated),
        })
    }

    fn plan_unstack(&self, stack_index: usize, answer_index: usize) -> Result<Change, Ignored> {
        let answers = self.answers();
        let entry = answers.get(stack_index).ok_or(Ignored::OutOfRange)?;
        let AnswerEntry::Stacked(stack) = entry else {
            return Err(Ignored::NotAStack);
        };
        if answer_index >= stack.len() {
            return Err(Ignored::OutOfRange);
        }

        let mut remaining = stack.answers.clone();
        let removed = remaining.remove(answer_index);

        let replacement: Vec<AnswerEntry> = if remaining.len() <= 1 {
            stack.answers.iter().cloned().map(AnswerEntry::Single).collect()
        } else {
            vec![
                AnswerEntry::Stacked(AnswerStack::from_answers(remaining)),
                AnswerEntry::Single(removed),
            ]
        };

        let mut updated = answers.to_vec();
        updated.splice(stack_index..=stack_index, replacement);

        Ok(Change {
            questions: None,
            answers: Some(updated),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::OrderSnapshot;
    use std::cell::Cell;
    use std::rc::Rc;

    fn cast(hash: &str) -> Cast {
        Cast {
            hash: hash.to_owned(),
            ..Default::default()
        }
    }

    fn board(answers: &[&str]) -> QaBoard {
        QaBoard::new(
            vec![cast("q1"), cast("q2"), cast("q3")],
            answers.iter().map(|hash| cast(hash)).collect(),
            true,
        )
    }

    fn keys(board: &QaBoard) -> Vec<String> {
        board.answers().iter().map(|a| a.key().to_owned()).collect()
    }

    #[test]
    fn stacking_two_singles() {
        let mut board = board(&["a1", "a2", "a3"]);
        assert!(board.stack(0).is_applied());
        assert_eq!(keys(&board), vec!["stack-a1-a2", "a3"]);
        assert_eq!(board.answer(0).unwrap().answers().len(), 2);
    }

    #[test]
    fn stacking_grows_existing_stack_up_to_limit() {
        let mut board = board(&["a1", "a2", "a3", "a4"]);
        assert!(board.stack(0).is_applied());
        assert!(board.stack(0).is_applied());
        assert_eq!(keys(&board), vec!["stack-a1-a2-a3", "a4"]);

        let before = board.snapshot();
        assert_eq!(board.stack(0), Outcome::Ignored(Ignored::StackLimitExceeded));
        assert_eq!(board.answer(0).unwrap().answers().len(), 3);
        assert_eq!(board.snapshot(), before);
        assert!(!board.can_stack(0));
    }

    #[test]
    fn stacking_onto_a_stack_neighbour_is_ignored() {
        let mut board = board(&["a1", "a2", "a3"]);
        assert!(board.stack(1).is_applied());
        assert_eq!(keys(&board), vec!["a1", "stack-a2-a3"]);

        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _subscription =
            board.subscribe(Rc::new(move |_: &OrderSnapshot| counter.set(counter.get() + 1)));

        assert_eq!(board.stack(0), Outcome::Ignored(Ignored::AdjacentAlreadyStacked));
        assert_eq!(board.stack(1), Outcome::Ignored(Ignored::OutOfRange));
        assert_eq!(keys(&board), vec!["a1", "stack-a2-a3"]);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn stack_then_unstack_restores_order() {
        for answer_index in 0..2 {
            let mut board = board(&["a1", "a2", "a3"]);
            assert!(board.stack(0).is_applied());
            assert!(board.unstack(0, answer_index).is_applied());
            assert_eq!(keys(&board), vec!["a1", "a2", "a3"]);
        }
    }

    #[test]
    fn unstack_from_three_places_member_after_stack() {
        let mut board = board(&["a1", "a2", "a3", "a4"]);
        assert!(board.stack(0).is_applied());
        assert!(board.stack(0).is_applied());

        assert!(board.unstack(0, 0).is_applied());
        assert_eq!(keys(&board), vec!["stack-a2-a3", "a1", "a4"]);
    }

    #[test]
    fn unstack_rejects_singles_and_bad_members() {
        let mut board = board(&["a1", "a2", "a3"]);
        assert_eq!(board.unstack(0, 0), Outcome::Ignored(Ignored::NotAStack));
        assert_eq!(board.unstack(9, 0), Outcome::Ignored(Ignored::OutOfRange));

        assert!(board.stack(0).is_applied());
        assert_eq!(board.unstack(0, 2), Outcome::Ignored(Ignored::OutOfRange));
    }

    #[test]
    fn viewers_cannot_stack() {
        let mut board = QaBoard::new(vec![], vec![cast("a1"), cast("a2")], false);
        assert_eq!(board.stack(0), Outcome::Ignored(Ignored::PermissionDenied));
        assert!(!board.can_stack(0));
    }

    #[test]
    fn navigate_clamps_and_is_idempotent() {
        let mut board = board(&["a1", "a2", "a3"]);
        assert!(board.stack(0).is_applied());
        let stack = board.answer(0).and_then(AnswerEntry::as_stack).cloned().unwrap();

        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _subscription =
            board.subscribe(Rc::new(move |_: &OrderSnapshot| counter.set(counter.get() + 1)));

        assert!(board.navigate(&stack.id, 7));
        assert_eq!(board.displayed_index(&stack), 1);
        assert!(!board.navigate(&stack.id, 1));
        assert_eq!(board.displayed_answer(board.answer(0).unwrap()).unwrap().hash, "a2");
        assert!(!board.navigate("stack-missing", 0));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn empty_stack_has_nothing_to_display() {
        let board = board(&["a1"]);
        let empty = AnswerEntry::Stacked(AnswerStack {
            id: "stack-".to_owned(),
            answers: Vec::new(),
        });

        assert_eq!(board.displayed_answer(&empty), None);
        let single = board.answer(0).unwrap();
        assert_eq!(board.displayed_answer(single).map(|a| a.hash.as_str()), Some("a1"));
    }

    #[test]
    fn navigation_state_is_pruned_with_its_stack() {
        let mut board = board(&["a1", "a2", "a3"]);
        assert!(board.stack(0).is_applied());
        let id = board.answer(0).unwrap().key().to_owned();
        assert!(board.navigate(&id, 1));

        assert!(board.unstack(0, 1).is_applied());
        assert!(board.stack(0).is_applied());
        let stack = board.answer(0).and_then(AnswerEntry::as_stack).cloned().unwrap();
        assert_eq!(stack.id, id);
        assert_eq!(board.displayed_index(&stack), 0);
    }
}
