use crate::data::Cast;
use crate::entries::AnswerEntry;
use std::cell::RefCell;
use std::rc::Rc;

/// The committed order of both columns. Each mutation replaces the sequences
/// it touches with fresh allocations, so `Rc::ptr_eq` tells observers exactly
/// which column changed.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub questions: Rc<Vec<Cast>>,
    pub answers: Rc<Vec<AnswerEntry>>,
}

impl OrderSnapshot {
    pub fn same_questions(&self, other: &OrderSnapshot) -> bool {
        Rc::ptr_eq(&self.questions, &other.questions)
    }

    pub fn same_answers(&self, other: &OrderSnapshot) -> bool {
        Rc::ptr_eq(&self.answers, &other.answers)
    }
}

pub type OrderListener = Rc<dyn Fn(&OrderSnapshot)>;

#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Rc<RefCell<Vec<OrderListener>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: OrderListener) -> OrderSubscription {
        self.listeners.borrow_mut().push(listener.clone());
        OrderSubscription {
            listener,
            listeners: Rc::clone(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub(crate) fn notify(&self, snapshot: &OrderSnapshot) {
        // Listeners may subscribe or drop subscriptions while being called.
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            (listener)(snapshot);
        }
    }
}

/// Keeps a listener registered; dropping it unsubscribes.
pub struct OrderSubscription {
    listener: OrderListener,
    listeners: Rc<RefCell<Vec<OrderListener>>>,
}

impl Drop for OrderSubscription {
    fn drop(&mut self) {
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|item| !Rc::ptr_eq(item, &self.listener));
    }
}
