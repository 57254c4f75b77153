pub mod config;
pub mod data;
pub mod entries;
pub mod matchflow;
pub mod mode;
pub mod notify;
pub mod reorder;
pub mod stacking;
pub mod storage;

pub use config::{AppConfig, CrossColumnPolicy};
pub use data::{Author, Cast, RootCast, SeedData};
pub use entries::{AnswerEntry, AnswerStack, Column, Ignored, Outcome, QaBoard, MAX_STACK_SIZE};
pub use matchflow::{ChainSubmitter, MatchRecord, Submission, SubmissionStatus, SubmitError};
pub use mode::{Mode, ModeController, ModeView};
pub use notify::{OrderSnapshot, OrderSubscription};
pub use reorder::{DragGesture, MoveKind, Slot};

use config::fetch_config;
use data::fetch_thread;
use log::{info, warn};
use matchflow::{prepare_submission, submit, RelaySubmitter};
use mode::WindowViewport;
use std::cell::RefCell;
use std::rc::Rc;
use storage::{align_order, OrderStore, StoredOrder};
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen_futures::spawn_local;
use web_sys::{window, HtmlSelectElement, UrlSearchParams};
use yew::prelude::*;

#[derive(PartialEq, Clone)]
enum FetchStatus {
    Idle,
    Loading,
    Error(String),
}

type BoardCell = Rc<RefCell<Option<QaBoard>>>;
type SubscriptionCell = Rc<RefCell<Vec<OrderSubscription>>>;

/// Callbacks the board markup hands to its rows and cells.
#[derive(Clone)]
struct BoardActions {
    drag_start: Callback<Slot>,
    drop: Callback<Slot>,
    drag_end: Callback<()>,
    quick_move: Callback<(MoveKind, usize, usize)>,
    stack: Callback<usize>,
    unstack: Callback<(usize, usize)>,
    navigate: Callback<(String, usize)>,
}

#[function_component(App)]
fn app() -> Html {
    let status = use_state(|| FetchStatus::Loading);
    let config = use_state(|| None::<AppConfig>);
    let seed = use_state(|| None::<SeedData>);
    let board: BoardCell = use_mut_ref(|| None::<QaBoard>);
    let subscriptions: SubscriptionCell = use_mut_ref(Vec::<OrderSubscription>::new);
    let controller = use_mut_ref(|| None::<ModeController>);
    let mode_view = use_state(|| ModeView {
        mode: Mode::Paired,
        forced: true,
    });
    let drag_source = use_state(|| None::<Slot>);
    let submission = use_state(|| SubmissionStatus::Idle);
    let show_reset_confirm = use_state(|| false);
    let force_update = use_force_update();

    {
        let status = status.clone();
        let config = config.clone();
        let seed = seed.clone();
        let board = board.clone();
        let subscriptions = subscriptions.clone();

        use_effect_with_deps(
            move |_| {
                spawn_local(async move {
                    let loaded = fetch_config().await;
                    log::set_max_level(loaded.log_level().to_level_filter());

                    let Some(source_url) = source_url() else {
                        status.set(FetchStatus::Error(
                            "Add ?url=<thread url> to the address to load an AMA.".to_owned(),
                        ));
                        config.set(Some(loaded));
                        return;
                    };

                    match fetch_thread(&loaded.thread_endpoint, &source_url).await {
                        Ok(fetched) => {
                            let store = OrderStore::new(loaded.order_endpoint());
                            let stored = store.load(&fetched.root.cast.hash).await;
                            install_board(
                                &board,
                                &subscriptions,
                                &fetched,
                                &loaded,
                                stored.as_ref(),
                            );
                            info!(
                                "loaded {} questions and {} answers",
                                fetched.second_tier.len(),
                                fetched.third_tier.len()
                            );
                            seed.set(Some(fetched));
                            status.set(FetchStatus::Idle);
                        }
                        Err(err) => {
                            warn!("failed to load thread {}: {}", source_url, err);
                            status.set(FetchStatus::Error(err.to_string()));
                        }
                    }
                    config.set(Some(loaded));
                });

                || ()
            },
            (),
        );
    }

    {
        let controller = controller.clone();
        let mode_view = mode_view.clone();
        let breakpoint = (*config).as_ref().map(|config| config.paired_breakpoint_px);

        use_effect_with_deps(
            move |breakpoint: &Option<f64>| {
                if let Some(breakpoint) = *breakpoint {
                    let mut next = ModeController::new(Rc::new(WindowViewport), breakpoint);
                    let view_handle = mode_view.clone();
                    next.on_change(Rc::new(move |view: ModeView| view_handle.set(view)));
                    next.attach();
                    mode_view.set(next.view());
                    *controller.borrow_mut() = Some(next);
                }

                move || {
                    if let Some(mut active) = controller.borrow_mut().take() {
                        active.detach();
                    }
                }
            },
            breakpoint,
        );
    }

    let actions = {
        let drag_start = {
            let drag_source = drag_source.clone();
            Callback::from(move |slot: Slot| drag_source.set(Some(slot)))
        };

        let drop = {
            let drag_source = drag_source.clone();
            let apply = board_action(&board, &force_update, |board, gesture: DragGesture| {
                board.apply_drag(&gesture).is_applied()
            });
            Callback::from(move |destination: Slot| {
                let Some(source) = *drag_source else {
                    return;
                };
                drag_source.set(None);
                apply.emit(DragGesture {
                    source,
                    destination: Some(destination),
                });
            })
        };

        let drag_end = {
            let drag_source = drag_source.clone();
            let apply = board_action(&board, &force_update, |board, gesture: DragGesture| {
                board.apply_drag(&gesture).is_applied()
            });
            Callback::from(move |_: ()| {
                let Some(source) = *drag_source else {
                    return;
                };
                drag_source.set(None);
                apply.emit(DragGesture {
                    source,
                    destination: None,
                });
            })
        };

        BoardActions {
            drag_start,
            drop,
            drag_end,
            quick_move: board_action(&board, &force_update, |board, (kind, from, to): (MoveKind, usize, usize)| {
                board.quick_move(kind, from, to).is_applied()
            }),
            stack: board_action(&board, &force_update, |board, index: usize| {
                board.stack(index).is_applied()
            }),
            unstack: board_action(&board, &force_update, |board, (stack_index, answer_index): (usize, usize)| {
                board.unstack(stack_index, answer_index).is_applied()
            }),
            navigate: board_action(&board, &force_update, |board, (stack_id, index): (String, usize)| {
                board.navigate(&stack_id, index)
            }),
        }
    };

    let on_toggle_mode = {
        let controller = controller.clone();
        Callback::from(move |_: MouseEvent| {
            if let Some(controller) = controller.borrow().as_ref() {
                controller.toggle();
            }
        })
    };

    let on_submit = {
        let board = board.clone();
        let config = config.clone();
        let seed = seed.clone();
        let submission = submission.clone();

        Callback::from(move |_: MouseEvent| {
            let (Some(config), Some(seed)) = ((*config).clone(), (*seed).as_ref()) else {
                return;
            };
            let Some(endpoint) = config.submit_endpoint().map(str::to_owned) else {
                return;
            };
            let Some(snapshot) = board.borrow().as_ref().map(QaBoard::snapshot) else {
                return;
            };

            let prepared = match prepare_submission(&seed.root.cast.hash, &snapshot) {
                Ok(prepared) => prepared,
                Err(err) => {
                    submission.set(SubmissionStatus::Failed(err.to_string()));
                    return;
                }
            };

            submission.set(SubmissionStatus::Pending);
            let submission = submission.clone();
            spawn_local(async move {
                let result = match RelaySubmitter::connect(endpoint).await {
                    Ok(submitter) => submit(&submitter, config.expected_chain_id, &prepared).await,
                    Err(err) => Err(err),
                };
                match result {
                    Ok(handle) => submission.set(SubmissionStatus::Confirmed(handle)),
                    Err(err) => {
                        warn!("submission failed: {}", err);
                        submission.set(SubmissionStatus::Failed(err.to_string()));
                    }
                }
            });
        })
    };

    let request_reset = {
        let show_reset_confirm = show_reset_confirm.clone();
        Callback::from(move |_: MouseEvent| show_reset_confirm.set(true))
    };

    let cancel_reset = {
        let show_reset_confirm = show_reset_confirm.clone();
        Callback::from(move |_: MouseEvent| show_reset_confirm.set(false))
    };

    let confirm_reset = {
        let board = board.clone();
        let subscriptions = subscriptions.clone();
        let config = config.clone();
        let seed = seed.clone();
        let show_reset_confirm = show_reset_confirm.clone();
        let force_update = force_update.clone();

        Callback::from(move |_: MouseEvent| {
            if let (Some(config), Some(seed)) = ((*config).as_ref(), (*seed).as_ref()) {
                install_board(&board, &subscriptions, seed, config, None);
                let fresh = board
                    .borrow()
                    .as_ref()
                    .map(|board| StoredOrder::from_snapshot(&seed.root.cast.hash, &board.snapshot()));
                if let Some(fresh) = fresh {
                    OrderStore::new(config.order_endpoint()).reset(fresh);
                }
                info!("order reset for {}", seed.root.cast.hash);
            }
            show_reset_confirm.set(false);
            force_update.force_update();
        })
    };

    let content = match &*status {
        FetchStatus::Loading => html! { <p class="placeholder">{ "Loading AMA…" }</p> },
        FetchStatus::Error(message) => html! { <p class="error">{ message }</p> },
        FetchStatus::Idle => {
            let board_ref = board.borrow();
            match (board_ref.as_ref(), (*seed).as_ref()) {
                (Some(board), Some(seed)) => {
                    let columns = match mode_view.mode {
                        Mode::Paired => render_paired(board, *drag_source, &actions),
                        Mode::Matching => render_matching(board, *drag_source, &actions),
                    };
                    let submit_enabled = (*config)
                        .as_ref()
                        .and_then(AppConfig::submit_endpoint)
                        .is_some();

                    html! {
                        <>
                            { render_header(seed) }
                            <div class="board-toolbar">
                                <button class="mode-toggle"
                                    disabled={mode_view.forced}
                                    onclick={on_toggle_mode}>
                                    { match mode_view.mode {
                                        Mode::Paired => "Match columns",
                                        Mode::Matching => "Lock pairs",
                                    } }
                                </button>
                                {
                                    if board.can_edit() {
                                        render_reset(*show_reset_confirm, request_reset, cancel_reset, confirm_reset)
                                    } else {
                                        html! {}
                                    }
                                }
                            </div>
                            { columns }
                            {
                                if board.can_edit() && submit_enabled {
                                    render_submission(&submission, on_submit)
                                } else {
                                    html! {}
                                }
                            }
                        </>
                    }
                }
                _ => html! { <p class="placeholder">{ "Nothing to show yet." }</p> },
            }
        }
    };

    html! {
        <div class="app-container">
            <main class="content">
                { content }
            </main>
        </div>
    }
}

/// Builds a fresh board from the fetched thread, restoring `stored` when
/// given. Admins get every committed change written back to the order store.
fn install_board(
    board: &BoardCell,
    subscriptions: &SubscriptionCell,
    seed: &SeedData,
    config: &AppConfig,
    stored: Option<&StoredOrder>,
) {
    let (questions, answers) =
        align_order(seed.second_tier.clone(), seed.third_tier.clone(), stored);
    let next = QaBoard::from_entries(questions, answers, config.admin_mode)
        .with_policy(config.cross_column_policy);

    let mut active = subscriptions.borrow_mut();
    active.clear();
    if config.admin_mode {
        let store = OrderStore::new(config.order_endpoint());
        active.push(next.subscribe(store.listener(seed.root.cast.hash.clone())));
    }
    *board.borrow_mut() = Some(next);
}

/// Wraps a board operation in a callback. The board borrow is released
/// before re-rendering.
fn board_action<T: 'static>(
    board: &BoardCell,
    force_update: &UseForceUpdateHandle,
    apply: impl Fn(&mut QaBoard, T) -> bool + 'static,
) -> Callback<T> {
    let board = board.clone();
    let force_update = force_update.clone();
    Callback::from(move |input: T| {
        let changed = board
            .borrow_mut()
            .as_mut()
            .map_or(false, |board| apply(board, input));
        if changed {
            force_update.force_update();
        }
    })
}

fn source_url() -> Option<String> {
    let search = window()?.location().search().ok()?;
    let params = UrlSearchParams::new_with_str(&search).ok()?;
    params.get("url").filter(|url| !url.trim().is_empty())
}

struct DragHandlers {
    start: Callback<DragEvent>,
    over: Callback<DragEvent>,
    drop: Callback<DragEvent>,
    end: Callback<DragEvent>,
}

impl DragHandlers {
    fn for_slot(slot: Slot, actions: &BoardActions) -> Self {
        let start = {
            let drag_start = actions.drag_start.clone();
            Callback::from(move |event: DragEvent| {
                if let Some(transfer) = event.data_transfer() {
                    transfer.set_effect_allowed("move");
                    let _ = transfer.set_data("text/plain", &slot.index.to_string());
                }
                drag_start.emit(slot);
            })
        };
        let drop = {
            let on_drop = actions.drop.clone();
            Callback::from(move |event: DragEvent| {
                event.prevent_default();
                event.stop_propagation();
                on_drop.emit(slot);
            })
        };
        let end = {
            let drag_end = actions.drag_end.clone();
            Callback::from(move |_: DragEvent| drag_end.emit(()))
        };

        Self {
            start,
            over: Callback::from(|event: DragEvent| event.prevent_default()),
            drop,
            end,
        }
    }
}

fn render_header(seed: &SeedData) -> Html {
    let root = &seed.root.cast;
    html! {
        <header class="ama-header">
            <div class="ama-host">
                <img class="avatar" src={root.author.avatar_url.clone()} alt="" />
                <div>
                    <p class="display-name">{ &root.author.display_name }</p>
                    <p class="handle">{ format!("@{}", root.author.handle()) }</p>
                </div>
            </div>
            <p class="ama-text">{ &root.text }</p>
            <p class="ama-answerer">
                { format!("Answering: {} (@{})", seed.answerer.display_name, seed.answerer.handle()) }
            </p>
        </header>
    }
}

fn render_cast(cast: &Cast, class: &'static str) -> Html {
    html! {
        <div class={classes!("cast", class)}>
            <div class="cast-author">
                <img class="avatar" src={cast.author.avatar_url.clone()} alt="" />
                <span class="display-name">{ &cast.author.display_name }</span>
                <span class="handle">{ format!("@{}", cast.author.handle()) }</span>
                <span class="posted-on">{ cast.posted_on() }</span>
            </div>
            <p class="cast-text">{ &cast.text }</p>
            <div class="cast-reactions">
                <span>{ format!("♥ {}", cast.reactions.likes_count) }</span>
                <span>{ format!("⟲ {}", cast.reactions.recasts_count) }</span>
            </div>
        </div>
    }
}

fn render_answer_entry(board: &QaBoard, index: usize, entry: &AnswerEntry, actions: &BoardActions) -> Html {
    let answer = board
        .displayed_answer(entry)
        .map(|cast| render_cast(cast, "answer"))
        .unwrap_or_default();

    let stack_controls = match entry.as_stack() {
        Some(stack) => {
            let shown = board.displayed_index(stack);
            let previous = {
                let navigate = actions.navigate.clone();
                let id = stack.id.clone();
                Callback::from(move |_: MouseEvent| {
                    navigate.emit((id.clone(), shown.saturating_sub(1)))
                })
            };
            let next = {
                let navigate = actions.navigate.clone();
                let id = stack.id.clone();
                Callback::from(move |_: MouseEvent| navigate.emit((id.clone(), shown + 1)))
            };
            let unstack = {
                let unstack = actions.unstack.clone();
                Callback::from(move |_: MouseEvent| unstack.emit((index, shown)))
            };

            html! {
                <div class="stack-controls">
                    <button class="stack-nav" disabled={shown == 0} onclick={previous}>{ "‹" }</button>
                    <span class="stack-position">{ format!("{} / {}", shown + 1, stack.len()) }</span>
                    <button class="stack-nav" disabled={shown + 1 >= stack.len()} onclick={next}>{ "›" }</button>
                    {
                        if board.can_edit() {
                            html! { <button class="unstack" onclick={unstack}>{ "Unstack" }</button> }
                        } else {
                            html! {}
                        }
                    }
                </div>
            }
        }
        None => html! {},
    };

    let stack_button = if board.can_stack(index) {
        let stack = actions.stack.clone();
        let onclick = Callback::from(move |_: MouseEvent| stack.emit(index));
        html! { <button class="stack-next" {onclick}>{ "Stack with next" }</button> }
    } else {
        html! {}
    };

    html! {
        <div class={classes!("answer-entry", entry.is_stacked().then_some("stacked"))}>
            { answer }
            { stack_controls }
            { stack_button }
        </div>
    }
}

fn render_position_picker(board: &QaBoard, kind: MoveKind, index: usize, actions: &BoardActions) -> Html {
    if !board.can_edit() {
        return html! {};
    }

    let onchange = {
        let quick_move = actions.quick_move.clone();
        Callback::from(move |event: Event| {
            let Some(select) = event.target_dyn_into::<HtmlSelectElement>() else {
                return;
            };
            if let Ok(position) = select.value().parse::<usize>() {
                if position >= 1 {
                    quick_move.emit((kind, index, position - 1));
                }
            }
        })
    };

    html! {
        <select class="position-picker" {onchange}>
            { for board.position_choices(kind).into_iter().map(|position| html! {
                <option value={position.to_string()} selected={position == index + 1}>
                    { position.to_string() }
                </option>
            }) }
        </select>
    }
}

fn render_paired(board: &QaBoard, dragging: Option<Slot>, actions: &BoardActions) -> Html {
    html! {
        <div class="qa-pairs">
            { for board.pairs().map(|row| {
                let slot = Slot::new(Column::Pairs, row.index);
                let handlers = DragHandlers::for_slot(slot, actions);
                let key = format!(
                    "{}:{}",
                    row.question.map_or("", |question| question.hash.as_str()),
                    row.answer.map_or("", AnswerEntry::key)
                );
                html! {
                    <div key={key}
                        class={classes!("qa-pair", (dragging == Some(slot)).then_some("dragging"))}
                        draggable={if board.can_edit() { "true" } else { "false" }}
                        ondragstart={handlers.start}
                        ondragover={handlers.over}
                        ondrop={handlers.drop}
                        ondragend={handlers.end}>
                        <span class="row-number">{ (row.index + 1).to_string() }</span>
                        <div class="qa-question">
                            { row.question.map(|question| render_cast(question, "question")).unwrap_or_default() }
                        </div>
                        <div class="qa-answer">
                            { row.answer.map(|entry| render_answer_entry(board, row.index, entry, actions)).unwrap_or_default() }
                        </div>
                        { render_position_picker(board, MoveKind::Pair, row.index, actions) }
                    </div>
                }
            }) }
        </div>
    }
}

fn render_matching(board: &QaBoard, dragging: Option<Slot>, actions: &BoardActions) -> Html {
    let cell = |slot: Slot, key: String, body: Html, kind: MoveKind| {
        let handlers = DragHandlers::for_slot(slot, actions);
        html! {
            <div key={key}
                class={classes!("qa-cell", (dragging == Some(slot)).then_some("dragging"))}
                draggable={if board.can_edit() { "true" } else { "false" }}
                ondragstart={handlers.start}
                ondragover={handlers.over}
                ondrop={handlers.drop}
                ondragend={handlers.end}>
                { body }
                { render_position_picker(board, kind, slot.index, actions) }
            </div>
        }
    };

    let tail = |column: Column| {
        let handlers = DragHandlers::for_slot(Slot::new(column, board.len(column)), actions);
        html! {
            <div class="drop-tail" ondragover={handlers.over} ondrop={handlers.drop}></div>
        }
    };

    html! {
        <div class="qa-columns">
            <section class="qa-column questions">
                <h3>{ "Questions" }</h3>
                { for board.questions().iter().enumerate().map(|(index, question)| cell(
                    Slot::new(Column::Questions, index),
                    question.hash.clone(),
                    render_cast(question, "question"),
                    MoveKind::Question,
                )) }
                { tail(Column::Questions) }
            </section>
            <section class="qa-column answers">
                <h3>{ "Answers" }</h3>
                { for board.answers().iter().enumerate().map(|(index, entry)| cell(
                    Slot::new(Column::Answers, index),
                    entry.key().to_owned(),
                    render_answer_entry(board, index, entry, actions),
                    MoveKind::Answer,
                )) }
                { tail(Column::Answers) }
            </section>
        </div>
    }
}

fn render_reset(
    confirming: bool,
    on_request: Callback<MouseEvent>,
    on_cancel: Callback<MouseEvent>,
    on_confirm: Callback<MouseEvent>,
) -> Html {
    if confirming {
        html! {
            <div class="reset-confirm">
                <p>{ "Discard the saved order and start over?" }</p>
                <div class="confirm-actions">
                    <button class="confirm-yes" onclick={on_confirm}>{ "Yes" }</button>
                    <button class="confirm-no" onclick={on_cancel}>{ "No" }</button>
                </div>
            </div>
        }
    } else {
        html! { <button class="reset" onclick={on_request}>{ "Reset order" }</button> }
    }
}

fn render_submission(status: &SubmissionStatus, on_submit: Callback<MouseEvent>) -> Html {
    let pending = matches!(status, SubmissionStatus::Pending);
    let message = match status {
        SubmissionStatus::Idle => html! {},
        SubmissionStatus::Pending => html! { <p class="submit-pending">{ "Submitting matches…" }</p> },
        SubmissionStatus::Confirmed(handle) => html! {
            <p class="submit-confirmed">{ format!("Submitted: {}", handle.0) }</p>
        },
        SubmissionStatus::Failed(reason) => html! { <p class="error">{ reason }</p> },
    };

    html! {
        <div class="submit-panel">
            <button class="submit" disabled={pending} onclick={on_submit}>{ "Submit matches" }</button>
            { message }
        </div>
    }
}

#[wasm_bindgen(start)]
pub fn run_app() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Debug);
    yew::Renderer::<App>::new().render();
}
