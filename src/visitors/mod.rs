//! The visitor infrastructure and the fixed pass pipeline.
//!
//! Passes run in a fixed order over the evaluated tree:
//! import resolution (pre-evaluation) → join-selectors → extend finding →
//! extend processing → to-CSS.  Each pass assumes the previous one has
//! completed.
//!
//! Structural visitors implement [`Visitor`]; the driver walks the rule tree
//! and calls the per-kind entry/exit hooks.  Entry hooks can clear
//! `visit_deeper` to skip a subtree.  The to-CSS pass is the one replacing
//! pass and has its own transform in [`to_css`].

use std::rc::Rc;

use crate::error::LessError;
use crate::node::Node;
use crate::tree::atrule::{AtRule, Container, Media};
use crate::tree::declaration::Declaration;
use crate::tree::extend::Extend;
use crate::tree::import::Import;
use crate::tree::mixin::MixinDefinition;
use crate::tree::ruleset::Ruleset;

pub mod extend;
pub mod import;
pub mod join_selector;
pub mod to_css;

/// Mutable per-visit flags handed to entry hooks.
pub struct VisitArgs {
    pub visit_deeper: bool,
}

/// Entry/exit hooks per structural node kind.  Default implementations do
/// nothing, so a visitor only implements the kinds it cares about.
pub trait Visitor {
    fn visit_ruleset(
        &mut self,
        _ruleset: &Rc<Ruleset>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_ruleset_out(&mut self, _ruleset: &Rc<Ruleset>) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_media(&mut self, _media: &Rc<Media>, _args: &mut VisitArgs) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_media_out(&mut self, _media: &Rc<Media>) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_container(
        &mut self,
        _container: &Rc<Container>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_container_out(&mut self, _container: &Rc<Container>) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_atrule(
        &mut self,
        _atrule: &Rc<AtRule>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_atrule_out(&mut self, _atrule: &Rc<AtRule>) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_import(
        &mut self,
        _import: &Rc<Import>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_declaration(
        &mut self,
        _declaration: &Declaration,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_declaration_out(&mut self, _declaration: &Declaration) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_mixin_definition(
        &mut self,
        _definition: &Rc<MixinDefinition>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_mixin_definition_out(
        &mut self,
        _definition: &Rc<MixinDefinition>,
    ) -> Result<(), LessError> {
        Ok(())
    }

    fn visit_extend(&mut self, _extend: &Rc<Extend>, _args: &mut VisitArgs) -> Result<(), LessError> {
        Ok(())
    }
}

/// Drives a visitor over a node and its structural children.
pub fn visit_node(visitor: &mut dyn Visitor, node: &Node) -> Result<(), LessError> {
    match node {
        Node::Ruleset(r) => {
            let mut args = VisitArgs { visit_deeper: true };
            visitor.visit_ruleset(r, &mut args)?;

            if args.visit_deeper {
                visit_rules(visitor, &r.rules.borrow().clone())?;
            }

            visitor.visit_ruleset_out(r)
        }

        Node::Media(m) => {
            let mut args = VisitArgs { visit_deeper: true };
            visitor.visit_media(m, &mut args)?;

            if args.visit_deeper {
                visit_rules(visitor, &m.rules.borrow().clone())?;
            }

            visitor.visit_media_out(m)
        }

        Node::Container(c) => {
            let mut args = VisitArgs { visit_deeper: true };
            visitor.visit_container(c, &mut args)?;

            if args.visit_deeper {
                visit_rules(visitor, &c.rules.borrow().clone())?;
            }

            visitor.visit_container_out(c)
        }

        Node::AtRule(a) => {
            let mut args = VisitArgs { visit_deeper: true };
            visitor.visit_atrule(a, &mut args)?;

            if args.visit_deeper {
                visit_rules(visitor, &a.rules.borrow().clone())?;
            }

            visitor.visit_atrule_out(a)
        }

        Node::Import(i) => {
            let mut args = VisitArgs { visit_deeper: true };
            visitor.visit_import(i, &mut args)?;

            if args.visit_deeper {
                if let Some(root) = i.root.borrow().clone() {
                    visit_node(visitor, &root)?;
                }
            }

            Ok(())
        }

        Node::Declaration(d) => {
            let mut args = VisitArgs { visit_deeper: true };
            visitor.visit_declaration(d, &mut args)?;

            if args.visit_deeper {
                if let Node::DetachedRuleset(detached) = &d.value {
                    visit_node(visitor, &Node::Ruleset(detached.ruleset.clone()))?;
                }
            }

            visitor.visit_declaration_out(d)
        }

        Node::MixinDefinition(m) => {
            let mut args = VisitArgs { visit_deeper: true };
            visitor.visit_mixin_definition(m, &mut args)?;

            if args.visit_deeper {
                visit_rules(visitor, &m.rules)?;
            }

            visitor.visit_mixin_definition_out(m)
        }

        Node::Extend(e) => {
            let mut args = VisitArgs { visit_deeper: true };
            visitor.visit_extend(e, &mut args)
        }

        // Value nodes have no structural children to visit.
        _ => Ok(()),
    }
}

pub fn visit_rules(visitor: &mut dyn Visitor, rules: &[Node]) -> Result<(), LessError> {
    for rule in rules {
        visit_node(visitor, rule)?;
    }
    Ok(())
}
