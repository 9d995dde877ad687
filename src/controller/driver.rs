//! Feeds user actions to a [`StepController`] one at a time. An action that
//! arrives while an engine call is pending supersedes it: the pending
//! transition is dropped before it commits and the new one starts.

use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::{Action, StepController};
use crate::engine::Engine;
use crate::format::ControllerView;

/// Front-end side of a [`Driver`].
pub struct DriverHandle {
    pub actions: mpsc::Sender<Action>,
    pub views: watch::Receiver<ControllerView>,
    /// Actions the driver had received when it last published a view.
    answered: watch::Receiver<u64>,
    sent: u64,
}

impl DriverHandle {
    /// Queues an action. False once the driver has stopped.
    pub async fn dispatch(&mut self, action: Action) -> bool {
        let queued = self.actions.send(action).await.is_ok();
        if queued {
            self.sent += 1;
        }
        queued
    }

    /// True while a dispatched action has no published view yet. A superseded
    /// action is answered by the view of the one that replaced it.
    pub fn pending(&self) -> bool {
        *self.answered.borrow() < self.sent
    }

    pub fn view(&self) -> ControllerView {
        self.views.borrow().clone()
    }
}

pub struct Driver<E> {
    controller: StepController<E>,
    actions: mpsc::Receiver<Action>,
    views: watch::Sender<ControllerView>,
    answered: watch::Sender<u64>,
}

/// Wraps `controller` in a driver. The view channel starts with the
/// controller's current view.
pub fn channel<E: Engine>(controller: StepController<E>) -> (DriverHandle, Driver<E>) {
    let (action_tx, action_rx) = mpsc::channel(16);
    let (view_tx, view_rx) = watch::channel(ControllerView::of(&controller));
    let (answered_tx, answered_rx) = watch::channel(0);
    let handle = DriverHandle { actions: action_tx, views: view_rx, answered: answered_rx, sent: 0 };
    let driver = Driver { controller, actions: action_rx, views: view_tx, answered: answered_tx };
    (handle, driver)
}

impl<E: Engine> Driver<E> {
    /// Runs until every sender is dropped, then hands the controller back.
    /// A pending action still completes once the channel closes.
    pub async fn run(mut self) -> StepController<E> {
        let mut next = None;
        let mut received: u64 = 0;
        loop {
            let action = match next.take() {
                Some(action) => action,
                None => match self.actions.recv().await {
                    Some(action) => {
                        received += 1;
                        action
                    }
                    None => break,
                },
            };
            let name = action.name();
            let mut closed = false;
            {
                let transition = self.controller.apply(action);
                tokio::pin!(transition);
                loop {
                    tokio::select! {
                        biased;
                        outcome = &mut transition => {
                            if let Err(e) = outcome {
                                debug!(action = name, error = %e, "action failed");
                            }
                            break;
                        }
                        incoming = self.actions.recv(), if !closed => match incoming {
                            Some(newer) => {
                                received += 1;
                                debug!(superseded = name, by = newer.name(), "action superseded");
                                next = Some(newer);
                                break;
                            }
                            None => closed = true,
                        },
                    }
                }
            }
            if next.is_none() {
                // the count goes first so a reader woken by the view sees it
                self.answered.send_replace(received);
                self.views.send_replace(ControllerView::of(&self.controller));
            }
        }
        self.controller
    }
}
