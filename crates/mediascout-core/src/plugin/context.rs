use tokio_util::sync::CancellationToken;

use crate::number::Number;

/// State for one pipeline invocation.
///
/// Created by the runner before the first stage and dropped after the last.
/// Stages that derive something later stages need (such as the identifier
/// being searched) store it here rather than widening the hook signatures.
#[derive(Debug, Clone, Default)]
pub struct PluginContext {
    cancel: CancellationToken,
    number: Option<Number>,
}

impl PluginContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            number: None,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The identifier this invocation is resolving, once the runner has set it.
    pub fn number(&self) -> Option<&Number> {
        self.number.as_ref()
    }

    pub fn set_number(&mut self, number: Number) {
        self.number = Some(number);
    }
}
