//! Configuration shared by the orchestrating engines.

/// Settings for saga-driven orchestration.
///
/// # Examples
///
/// ```
/// use eventfold_decider::OrchestrationConfig;
///
/// // Default: no depth limit.
/// let config = OrchestrationConfig::default();
/// assert_eq!(config.max_depth, None);
///
/// let config = OrchestrationConfig::default().max_depth(8);
/// assert_eq!(config.max_depth, Some(8));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestrationConfig {
    /// Deepest saga hop an orchestration may reach.
    ///
    /// The initiating command is at depth 0 and a command derived from an
    /// event of a depth-`n` command is at depth `n + 1`. `None` means
    /// unbounded: callers composing sagas are then responsible for avoiding
    /// command/event cycles.
    pub max_depth: Option<usize>,
}

impl OrchestrationConfig {
    /// Limit saga recursion to `depth` hops.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Whether a command at `depth` is within the limit.
    pub(crate) fn allows(&self, depth: usize) -> bool {
        self.max_depth.is_none_or(|max| depth <= max)
    }
}
