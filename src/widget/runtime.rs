// src/widget/runtime.rs
//! Async driver for one widget: owns the [`WidgetSession`], waits out the
//! display delay, performs the submission call and runs the auto-close timer.
//!
//! Commands come in over an mpsc channel, state goes out over `watch`, and the
//! single [`Completion`] is delivered over `oneshot`. Closing while a call is
//! in flight drops the request future, so a late reply never reaches the
//! session.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};

use super::client::{SubmissionClient, SubmitError, SubmitReceipt};
use super::options::{PageContext, ShownFlag, WidgetOptions};
use super::session::{Completion, Step, SubmitRequest, SubmitTicket, WidgetSession};
use super::WidgetError;
use crate::model::{Score, SubmissionPayload};

/// Time the thank-you step stays on screen.
pub const THANKS_AUTO_CLOSE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetCommand {
    SelectScore(Score),
    Resume,
    Back,
    SetFeedback(String),
    Submit,
    Close,
}

/// What a renderer needs to draw the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetSnapshot {
    /// False while waiting out the display delay.
    pub mounted: bool,
    pub visible: bool,
    pub step: Step,
    pub selected_score: Option<u8>,
    pub label: Option<&'static str>,
    pub feedback: String,
    /// Submit control must be disabled while true.
    pub submitting: bool,
    /// Last failed attempt, shown with a retry affordance.
    pub last_error: Option<String>,
}

impl WidgetSnapshot {
    fn of(session: &WidgetSession, mounted: bool) -> Self {
        Self {
            mounted,
            visible: mounted && session.visible(),
            step: session.step(),
            selected_score: session.selected_score().map(Score::get),
            label: session.selected_score().map(|s| s.category().label()),
            feedback: session.feedback_text().to_string(),
            submitting: session.is_submitting(),
            last_error: session.last_error().map(str::to_string),
        }
    }
}

type SubmitFuture =
    Pin<Box<dyn Future<Output = (SubmitTicket, Result<SubmitReceipt, SubmitError>)> + Send>>;

/// Caller side of a running widget.
#[derive(Debug)]
pub struct WidgetHandle {
    commands: mpsc::UnboundedSender<WidgetCommand>,
    state: watch::Receiver<WidgetSnapshot>,
    completion: Option<oneshot::Receiver<Completion>>,
    task: JoinHandle<()>,
}

impl WidgetHandle {
    pub fn select_score(&self, score: i64) -> Result<(), WidgetError> {
        let score = Score::new(score)?;
        self.send(WidgetCommand::SelectScore(score))
    }

    pub fn resume(&self) -> Result<(), WidgetError> {
        self.send(WidgetCommand::Resume)
    }

    pub fn back(&self) -> Result<(), WidgetError> {
        self.send(WidgetCommand::Back)
    }

    pub fn set_feedback(&self, text: impl Into<String>) -> Result<(), WidgetError> {
        self.send(WidgetCommand::SetFeedback(text.into()))
    }

    pub fn submit(&self) -> Result<(), WidgetError> {
        self.send(WidgetCommand::Submit)
    }

    pub fn close(&self) -> Result<(), WidgetError> {
        self.send(WidgetCommand::Close)
    }

    fn send(&self, cmd: WidgetCommand) -> Result<(), WidgetError> {
        self.commands.send(cmd).map_err(|_| WidgetError::Closed)
    }

    pub fn snapshot(&self) -> WidgetSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WidgetSnapshot> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `pred`.
    pub async fn wait_until(
        &mut self,
        pred: impl FnMut(&WidgetSnapshot) -> bool,
    ) -> Result<WidgetSnapshot, WidgetError> {
        self.state
            .wait_for(pred)
            .await
            .map(|snap| (*snap).clone())
            .map_err(|_| WidgetError::Closed)
    }

    /// The completion event. `None` if already taken.
    pub async fn completion(&mut self) -> Option<Completion> {
        match self.completion.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

struct WidgetTask {
    session: WidgetSession,
    mounted: bool,
    options: Arc<WidgetOptions>,
    context: PageContext,
    client: Arc<dyn SubmissionClient>,
    shown: Arc<dyn ShownFlag>,
    state_tx: watch::Sender<WidgetSnapshot>,
    completion_tx: Option<oneshot::Sender<Completion>>,
}

pub(crate) fn spawn(
    options: Arc<WidgetOptions>,
    context: PageContext,
    client: Arc<dyn SubmissionClient>,
    shown: Arc<dyn ShownFlag>,
    max_feedback_chars: usize,
) -> WidgetHandle {
    let session = WidgetSession::new(max_feedback_chars);
    let (state_tx, state_rx) = watch::channel(WidgetSnapshot::of(&session, false));
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();

    let task = WidgetTask {
        session,
        mounted: false,
        options,
        context,
        client,
        shown,
        state_tx,
        completion_tx: Some(done_tx),
    };
    let join = tokio::spawn(task.run(cmd_rx));

    WidgetHandle {
        commands: cmd_tx,
        state: state_rx,
        completion: Some(done_rx),
        task: join,
    }
}

impl WidgetTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<WidgetCommand>) {
        if !self.wait_for_display(&mut commands).await {
            return;
        }
        self.mounted = true;
        self.publish();
        tracing::debug!(
            target: "widget",
            position = self.options.position.as_str(),
            "widget mounted"
        );

        let mut pending: Option<SubmitFuture> = None;
        let mut auto_close: Option<Pin<Box<Sleep>>> = None;

        while self.session.visible() {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        if let Some(fut) = self.apply(cmd) {
                            pending = Some(fut);
                        }
                    }
                    // Handle dropped: nobody can interact any more.
                    None => {
                        let done = self.session.close();
                        self.complete(done);
                    }
                },
                (ticket, outcome) = poll_slot(&mut pending), if pending.is_some() => {
                    pending = None;
                    self.on_submit_result(ticket, outcome);
                    if self.session.step() == Step::Thanks {
                        auto_close = Some(Box::pin(sleep(THANKS_AUTO_CLOSE)));
                    }
                }
                _ = poll_slot(&mut auto_close), if auto_close.is_some() => {
                    auto_close = None;
                    let done = self.session.expire_thanks();
                    self.complete(done);
                }
            }
        }

        if pending.is_some() {
            tracing::debug!(target: "widget", "widget closed with submission in flight; cancelled");
        }
    }

    /// Sleep out the configured delay. Only `Close` is honoured meanwhile.
    /// Returns false if the widget was closed before it ever showed.
    async fn wait_for_display(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<WidgetCommand>,
    ) -> bool {
        let delay = self.options.display_delay();
        if delay.is_zero() {
            return true;
        }
        let wait = sleep(delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => return true,
                cmd = commands.recv() => match cmd {
                    Some(WidgetCommand::Close) | None => {
                        let done = self.session.close();
                        self.complete(done);
                        return false;
                    }
                    Some(_) => {}
                },
            }
        }
    }

    fn apply(&mut self, cmd: WidgetCommand) -> Option<SubmitFuture> {
        let changed = match cmd {
            WidgetCommand::SelectScore(score) => self.session.select_score(score),
            WidgetCommand::Resume => self.session.resume(),
            WidgetCommand::Back => self.session.back(),
            WidgetCommand::SetFeedback(text) => self.session.set_feedback(&text),
            WidgetCommand::Submit => match self.session.begin_submit() {
                Some(req) => {
                    let fut = self.submission(req);
                    self.publish();
                    return Some(fut);
                }
                None => {
                    tracing::debug!(target: "widget", "submit ignored");
                    false
                }
            },
            WidgetCommand::Close => {
                let done = self.session.close();
                self.complete(done);
                false
            }
        };
        if changed {
            self.publish();
        }
        None
    }

    fn submission(&self, req: SubmitRequest) -> SubmitFuture {
        let payload = SubmissionPayload {
            score: req.score.get(),
            feedback: Some(req.feedback),
            timestamp: Some(Utc::now()),
            url: self.context.url.clone(),
            user_agent: self.context.user_agent.clone(),
        };
        let client = Arc::clone(&self.client);
        let api_key = self.options.api_key.clone();
        let ticket = req.ticket;
        Box::pin(async move {
            let outcome = client.submit(&api_key, &payload).await;
            (ticket, outcome)
        })
    }

    fn on_submit_result(
        &mut self,
        ticket: SubmitTicket,
        outcome: Result<SubmitReceipt, SubmitError>,
    ) {
        match outcome {
            Ok(receipt) => {
                tracing::info!(target: "widget", id = %receipt.id, "NPS response accepted");
                if self.session.finish_submit(ticket, Ok(())) && self.options.show_once {
                    self.shown.set();
                }
            }
            Err(e) => {
                tracing::warn!(target: "widget", error = %e, "error submitting NPS response");
                self.session.finish_submit(ticket, Err(e.to_string()));
            }
        }
        self.publish();
    }

    fn complete(&mut self, done: Option<Completion>) {
        if let Some(c) = done {
            tracing::debug!(target: "widget", score = ?c.score, reason = ?c.reason, "widget closed");
            if let Some(tx) = self.completion_tx.take() {
                let _ = tx.send(c);
            }
        }
        self.publish();
    }

    fn publish(&self) {
        self.state_tx
            .send_replace(WidgetSnapshot::of(&self.session, self.mounted));
    }
}

/// Await the future in `slot`, or never resolve when the slot is empty.
async fn poll_slot<F>(slot: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}
