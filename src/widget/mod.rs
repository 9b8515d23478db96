// src/widget/mod.rs
//! Embeddable survey widget: options, session state machine, submission
//! client and the async runtime tying them together.

pub mod client;
pub mod options;
pub mod runtime;
pub mod session;

use std::sync::Arc;

pub use client::{HttpSubmissionClient, SubmissionClient, SubmitError, SubmitReceipt};
pub use options::{
    should_display, FileShownFlag, MemoryShownFlag, OptionsError, PageContext, Position,
    ShownFlag, WidgetOptions,
};
pub use runtime::{WidgetCommand, WidgetHandle, WidgetSnapshot, THANKS_AUTO_CLOSE};
pub use session::{CloseReason, Completion, Step, WidgetSession};

use crate::model::ScoreOutOfRange;
use crate::validate::SubmissionLimits;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WidgetError {
    #[error("invalid widget options: {0}")]
    InvalidOptions(#[from] OptionsError),
    #[error(transparent)]
    InvalidScore(#[from] ScoreOutOfRange),
    #[error("could not build submission client: {0}")]
    Client(#[from] SubmitError),
    #[error("widget is closed")]
    Closed,
}

/// Public entry point: validate `options`, apply the display policy and start
/// the widget. `Ok(None)` when `showOnce` suppresses it.
///
/// Must be called from within a tokio runtime.
pub fn init(
    options: WidgetOptions,
    context: PageContext,
    client: Arc<dyn SubmissionClient>,
    shown: Arc<dyn ShownFlag>,
) -> Result<Option<WidgetHandle>, WidgetError> {
    options.validate()?;
    if !should_display(&options, shown.as_ref()) {
        tracing::debug!(target: "widget", "already answered; widget suppressed");
        return Ok(None);
    }
    Ok(Some(runtime::spawn(
        Arc::new(options),
        context,
        client,
        shown,
        SubmissionLimits::default().max_feedback_chars,
    )))
}

/// [`init`] with an HTTP client pointed at `options.endpoint`.
pub fn init_http(
    options: WidgetOptions,
    context: PageContext,
    shown: Arc<dyn ShownFlag>,
) -> Result<Option<WidgetHandle>, WidgetError> {
    let client = HttpSubmissionClient::new(options.endpoint.clone())?;
    init(options, context, Arc::new(client), shown)
}
