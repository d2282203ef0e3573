//! Depth-first bookkeeping for saga-driven command cascades.

use std::collections::VecDeque;

use crate::config::OrchestrationConfig;
use crate::error::Error;

enum Frame<C, O> {
    /// Commands still to execute, all at the same depth.
    Commands(VecDeque<C>, usize),
    /// Outputs of one executed command still to hand to the saga.
    Outputs(VecDeque<O>, usize),
}

/// Work list of an orchestration.
///
/// Yields commands in depth-first, left-to-right order: the outputs of a
/// command are reacted to one at a time, and every command derived from an
/// output is executed (and its own cascade exhausted) before the next
/// sibling output is reacted to.
///
/// The driver loop is
/// `next_command` -> execute -> `push_outputs`, until `next_command`
/// returns `None`. Keeping the stack explicit lets the same bookkeeping
/// serve both the async event-sourced engines and the synchronous
/// in-memory cascade of the state-stored engines.
pub(crate) struct Cascade<'c, C, O> {
    stack: Vec<Frame<C, O>>,
    produced: Vec<O>,
    config: &'c OrchestrationConfig,
}

impl<'c, C, O> Cascade<'c, C, O> {
    pub(crate) fn new(command: C, config: &'c OrchestrationConfig) -> Self {
        Self {
            stack: vec![Frame::Commands(VecDeque::from([command]), 0)],
            produced: Vec::new(),
            config,
        }
    }

    /// The next command to execute and its depth.
    ///
    /// Outputs passed over on the way are recorded, in order, and handed to
    /// `react` to derive follow-up commands.
    pub(crate) fn next_command(
        &mut self,
        react: impl Fn(&O) -> Vec<C>,
    ) -> Option<Result<(C, usize), Error<C>>> {
        while let Some(frame) = self.stack.last_mut() {
            match frame {
                Frame::Commands(commands, depth) => {
                    let depth = *depth;
                    let Some(command) = commands.pop_front() else {
                        self.stack.pop();
                        continue;
                    };
                    if !self.config.allows(depth) {
                        tracing::warn!(depth, "orchestration aborted: depth limit exceeded");
                        return Some(Err(Error::DepthLimitExceeded {
                            input: command,
                            depth,
                        }));
                    }
                    return Some(Ok((command, depth)));
                }
                Frame::Outputs(outputs, depth) => {
                    let depth = *depth;
                    let Some(output) = outputs.pop_front() else {
                        self.stack.pop();
                        continue;
                    };
                    let follow_ups = react(&output);
                    self.produced.push(output);
                    if !follow_ups.is_empty() {
                        tracing::trace!(
                            count = follow_ups.len(),
                            depth = depth + 1,
                            "saga derived follow-up commands"
                        );
                        self.stack.push(Frame::Commands(follow_ups.into(), depth + 1));
                    }
                }
            }
        }
        None
    }

    /// Record the outputs of the command executed at `depth`.
    pub(crate) fn push_outputs(&mut self, outputs: Vec<O>, depth: usize) {
        if !outputs.is_empty() {
            self.stack.push(Frame::Outputs(outputs.into(), depth));
        }
    }

    /// Every output, in depth-first order.
    pub(crate) fn finish(self) -> Vec<O> {
        self.produced
    }
}
