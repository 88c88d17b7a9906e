//! Detached rulesets: blocks as values.

use crate::context::{EvalContext, Frame};
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use std::rc::Rc;

use crate::tree::ruleset::Ruleset;

/// A `{ ... }` block assigned to a variable and invoked later with `@var();`.
///
/// The frame stack at the point of definition is captured by value when the
/// detached ruleset is evaluated; invocation runs the body against those
/// frames, stacked over the caller's.
#[derive(Clone)]
pub struct DetachedRuleset {
    pub node: NodeCommon,
    pub ruleset: Rc<Ruleset>,

    /// `None` until evaluation captures the defining scope.
    pub frames: Option<Vec<Frame>>,
}

impl DetachedRuleset {
    pub fn new(ruleset: Rc<Ruleset>) -> DetachedRuleset {
        DetachedRuleset {
            node: NodeCommon::default(),
            ruleset,
            frames: None,
        }
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let frames = match &self.frames {
            Some(f) => f.clone(),
            None => context.frames_snapshot(),
        };

        Ok(Node::DetachedRuleset(DetachedRuleset {
            node: self.node.clone(),
            ruleset: self.ruleset.clone(),
            frames: Some(frames),
        }))
    }

    /// Invokes the block: evaluates the body with the captured frames below
    /// the caller's.  Media blocks evaluated inside register at the
    /// invocation site.
    pub fn call(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let frames = match &self.frames {
            Some(captured) => {
                let mut frames = context.frames.clone();
                frames.extend(captured.iter().cloned());
                frames
            }
            None => context.frames.clone(),
        };

        let evaluated = context.with_frames(frames, |ctx| self.ruleset.eval(ctx))?;
        Ok(Node::Ruleset(evaluated))
    }
}
