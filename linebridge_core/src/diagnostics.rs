//! Forwards `consoleLog` text from the module to the host's log.

use std::borrow::Cow;
use tracing::info;
use uuid::Uuid;

/// Log target for text emitted by render modules.
pub const MODULE_LOG_TARGET: &str = "linebridge::module";

/// Receives diagnostic text reported by the module.
///
/// `bytes` has already been range-checked and is only valid for the duration
/// of the call. Diagnostics never fail a render.
pub trait DiagnosticsConsumer: Send {
    fn on_log(&mut self, bytes: &[u8]);
}

impl<C: DiagnosticsConsumer + ?Sized> DiagnosticsConsumer for Box<C> {
    fn on_log(&mut self, bytes: &[u8]) {
        (**self).on_log(bytes)
    }
}

/// Decode module text, replacing invalid UTF-8 with U+FFFD.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// The host's diagnostics consumer: one `tracing` event per call.
#[derive(Debug, Clone)]
pub struct DiagnosticsSink {
    session_id: Uuid,
    module_name: String,
}

impl DiagnosticsSink {
    pub fn new(session_id: Uuid, module_name: impl Into<String>) -> Self {
        Self {
            session_id,
            module_name: module_name.into(),
        }
    }
}

impl DiagnosticsConsumer for DiagnosticsSink {
    fn on_log(&mut self, bytes: &[u8]) {
        let text = decode_text(bytes);
        info!(
            target: MODULE_LOG_TARGET,
            session_id = %self.session_id,
            module = %self.module_name,
            "{}", text
        );
    }
}
