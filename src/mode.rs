use gloo_events::EventListener;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;
use web_sys::window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Question and answer move together as one row.
    Paired,
    /// Two independent columns, paired by index.
    Matching,
}

/// What the view needs: the effective mode and whether a narrow viewport is
/// currently holding it in paired mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeView {
    pub mode: Mode,
    pub forced: bool,
}

pub type ModeListener = Rc<dyn Fn(ModeView)>;
pub type WidthListener = Rc<dyn Fn(f64)>;

/// Source of the current viewport width and its resize events.
pub trait ViewportProvider {
    fn width(&self) -> f64;
    fn subscribe(&self, listener: WidthListener) -> ViewportSubscription;
}

/// Keeps a resize listener alive. Dropping it releases the listener.
pub struct ViewportSubscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl ViewportSubscription {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn inert() -> Self {
        Self { release: None }
    }
}

impl Drop for ViewportSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// The browser window. Without a window the width reads as zero, which keeps
/// the board in paired mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowViewport;

impl WindowViewport {
    fn current_width() -> f64 {
        window()
            .and_then(|window| window.inner_width().ok())
            .and_then(|width| width.as_f64())
            .unwrap_or(0.0)
    }
}

impl ViewportProvider for WindowViewport {
    fn width(&self) -> f64 {
        Self::current_width()
    }

    fn subscribe(&self, listener: WidthListener) -> ViewportSubscription {
        let Some(window) = window() else {
            return ViewportSubscription::inert();
        };
        let resize = EventListener::new(&window, "resize", move |_event| {
            listener(Self::current_width());
        });
        ViewportSubscription::new(move || drop(resize))
    }
}

#[derive(Debug, Clone, Copy)]
struct ModeState {
    mode: Mode,
    width: f64,
    breakpoint: f64,
}

impl ModeState {
    fn is_narrow(&self) -> bool {
        self.width <= self.breakpoint
    }

    fn view(&self) -> ModeView {
        ModeView {
            mode: self.mode,
            forced: self.is_narrow(),
        }
    }
}

/// Paired/matching toggle. Narrow viewports (at or below the breakpoint)
/// force paired mode; widening again never brings matching mode back on its
/// own.
pub struct ModeController {
    state: Rc<RefCell<ModeState>>,
    listeners: Rc<RefCell<Vec<ModeListener>>>,
    viewport: Rc<dyn ViewportProvider>,
    subscription: Option<ViewportSubscription>,
}

impl ModeController {
    pub fn new(viewport: Rc<dyn ViewportProvider>, breakpoint: f64) -> Self {
        let width = viewport.width();
        Self {
            state: Rc::new(RefCell::new(ModeState {
                mode: Mode::Paired,
                width,
                breakpoint,
            })),
            listeners: Rc::new(RefCell::new(Vec::new())),
            viewport,
            subscription: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.state.borrow().mode
    }

    pub fn view(&self) -> ModeView {
        self.state.borrow().view()
    }

    pub fn width(&self) -> f64 {
        self.state.borrow().width
    }

    /// True while the viewport is too narrow for matching mode.
    pub fn is_forced(&self) -> bool {
        self.state.borrow().is_narrow()
    }

    pub fn on_change(&self, listener: ModeListener) {
        self.listeners.borrow_mut().push(listener);
    }

    /// Starts following viewport resizes. Calling it twice keeps a single
    /// listener.
    pub fn attach(&mut self) {
        if self.subscription.is_some() {
            return;
        }

        let state = Rc::clone(&self.state);
        let listeners = Rc::clone(&self.listeners);
        self.subscription = Some(self.viewport.subscribe(Rc::new(move |width| {
            apply_resize(&state, &listeners, width);
        })));

        let width = self.viewport.width();
        apply_resize(&self.state, &self.listeners, width);
    }

    pub fn detach(&mut self) {
        self.subscription = None;
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn resize(&self, width: f64) {
        apply_resize(&self.state, &self.listeners, width);
    }

    /// Explicit user choice. Ignored while the viewport is narrow.
    pub fn select(&self, mode: Mode) -> bool {
        let changed = {
            let mut state = self.state.borrow_mut();
            if state.is_narrow() || state.mode == mode {
                None
            } else {
                state.mode = mode;
                Some(state.view())
            }
        };

        match changed {
            Some(view) => {
                debug!("mode selected: {:?}", mode);
                emit(&self.listeners, view);
                true
            }
            None => false,
        }
    }

    pub fn toggle(&self) -> Mode {
        let next = match self.mode() {
            Mode::Paired => Mode::Matching,
            Mode::Matching => Mode::Paired,
        };
        self.select(next);
        self.mode()
    }
}

fn apply_resize(state: &RefCell<ModeState>, listeners: &RefCell<Vec<ModeListener>>, width: f64) {
    let (before, after) = {
        let mut state = state.borrow_mut();
        let before = state.view();
        state.width = width;
        if state.is_narrow() {
            state.mode = Mode::Paired;
        }
        (before, state.view())
    };

    if before != after {
        if before.mode != after.mode {
            debug!("viewport {}px forces paired mode", width);
        }
        emit(listeners, after);
    }
}

fn emit(listeners: &RefCell<Vec<ModeListener>>, view: ModeView) {
    let listeners = listeners.borrow().clone();
    for listener in listeners {
        listener(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct FakeViewport {
        width: Cell<f64>,
        listeners: Rc<RefCell<Vec<WidthListener>>>,
    }

    impl FakeViewport {
        fn with_width(width: f64) -> Rc<Self> {
            let viewport = Rc::new(Self::default());
            viewport.width.set(width);
            viewport
        }

        fn resize(&self, width: f64) {
            self.width.set(width);
            let listeners = self.listeners.borrow().clone();
            for listener in listeners {
                listener(width);
            }
        }

        fn listener_count(&self) -> usize {
            self.listeners.borrow().len()
        }
    }

    impl ViewportProvider for FakeViewport {
        fn width(&self) -> f64 {
            self.width.get()
        }

        fn subscribe(&self, listener: WidthListener) -> ViewportSubscription {
            self.listeners.borrow_mut().push(Rc::clone(&listener));
            let listeners = Rc::clone(&self.listeners);
            ViewportSubscription::new(move || {
                listeners
                    .borrow_mut()
                    .retain(|item| !Rc::ptr_eq(item, &listener));
            })
        }
    }

    #[test]
    fn starts_paired_on_any_width() {
        let wide = ModeController::new(FakeViewport::with_width(1024.0), 768.0);
        let narrow = ModeController::new(FakeViewport::with_width(600.0), 768.0);
        assert_eq!(wide.mode(), Mode::Paired);
        assert_eq!(narrow.mode(), Mode::Paired);
        assert!(narrow.is_forced());
        assert!(!wide.is_forced());
    }

    #[test]
    fn toggle_is_ignored_on_narrow_viewports() {
        let controller = ModeController::new(FakeViewport::with_width(768.0), 768.0);
        assert_eq!(controller.toggle(), Mode::Paired);
        assert!(!controller.select(Mode::Matching));
    }

    #[test]
    fn shrinking_forces_paired_and_growing_keeps_it() {
        let viewport = FakeViewport::with_width(1024.0);
        let mut controller = ModeController::new(viewport.clone(), 768.0);
        controller.attach();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        controller.on_change(Rc::new(move |view: ModeView| log.borrow_mut().push(view)));

        assert_eq!(controller.toggle(), Mode::Matching);
        viewport.resize(600.0);
        assert_eq!(controller.mode(), Mode::Paired);
        viewport.resize(1024.0);
        assert_eq!(controller.mode(), Mode::Paired);
        viewport.resize(1280.0);

        let view = |mode, forced| ModeView { mode, forced };
        assert_eq!(
            *seen.borrow(),
            vec![
                view(Mode::Matching, false),
                view(Mode::Paired, true),
                view(Mode::Paired, false),
            ]
        );
    }

    #[test]
    fn detach_releases_the_resize_listener() {
        let viewport = FakeViewport::with_width(1024.0);
        let mut controller = ModeController::new(viewport.clone(), 768.0);

        controller.attach();
        controller.attach();
        assert_eq!(viewport.listener_count(), 1);

        controller.detach();
        assert_eq!(viewport.listener_count(), 0);

        controller.attach();
        drop(controller);
        assert_eq!(viewport.listener_count(), 0);
    }

    #[test]
    fn detached_controller_ignores_resizes() {
        let viewport = FakeViewport::with_width(1024.0);
        let controller = ModeController::new(viewport.clone(), 768.0);
        controller.select(Mode::Matching);
        viewport.resize(500.0);
        assert_eq!(controller.mode(), Mode::Matching);

        controller.resize(500.0);
        assert_eq!(controller.mode(), Mode::Paired);
    }
}
