use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use crate::nodes::event::EventStream;
use crate::nodes::node::Node;
use crate::nodes::traits::NodeVisitor;
use crate::utils::errors::{Result, ScriptingError};

/// Visitor that prepares conditional statements for fuzzy evaluation: it
/// records, for each `if` node, the indices of the variables written inside
/// its branches (nested `if`s included), tracks the maximum nesting depth,
/// and stamps the product-level default smoothing width onto comparison
/// nodes that carry no script-level override. Runs after the indexer.
pub struct IfProcessor {
    var_stack: RefCell<Vec<HashSet<usize>>>,
    nested_if_lvl: Cell<usize>,
    max_nested_ifs: Cell<usize>,
    default_eps: f64,
}

impl IfProcessor {
    pub fn new() -> Self {
        Self {
            var_stack: RefCell::new(Vec::new()),
            nested_if_lvl: Cell::new(0),
            max_nested_ifs: Cell::new(0),
            default_eps: -1.0,
        }
    }

    /// Smoothing width applied to conditions without a `;eps` annotation.
    pub fn with_default_eps(mut self, eps: f64) -> Self {
        self.default_eps = eps;
        self
    }

    /// Maximum nesting depth encountered after visiting.
    pub fn max_nested_ifs(&self) -> usize {
        self.max_nested_ifs.get()
    }

    pub fn visit_events(&self, events: &mut EventStream) -> Result<()> {
        events.mut_events().iter_mut().try_for_each(|event| {
            event
                .mut_statements()
                .iter_mut()
                .try_for_each(|statement| self.visit(statement))
        })
    }

    fn record_write(&self, children: &[Node]) -> Result<()> {
        if self.nested_if_lvl.get() == 0 {
            return Ok(());
        }
        match children.first() {
            Some(Node::Var(data)) => {
                let index = data.index.ok_or_else(|| {
                    ScriptingError::Evaluation(format!(
                        "Variable {} not indexed",
                        data.name
                    ))
                })?;
                if let Some(top) = self.var_stack.borrow_mut().last_mut() {
                    top.insert(index);
                }
                Ok(())
            }
            _ => Err(ScriptingError::Syntax(
                "assignment target must be a variable".to_string(),
            )),
        }
    }
}

impl NodeVisitor for IfProcessor {
    type Output = Result<()>;

    fn visit(&self, node: &mut Node) -> Self::Output {
        match node {
            Node::If(data) => {
                // condition subtree first, to stamp smoothing widths
                let (condition, body) = match data.children.split_first_mut() {
                    Some(split) => split,
                    None => return Ok(()),
                };
                self.visit(condition)?;

                let lvl = self.nested_if_lvl.get() + 1;
                self.nested_if_lvl.set(lvl);
                if lvl > self.max_nested_ifs.get() {
                    self.max_nested_ifs.set(lvl);
                }
                self.var_stack.borrow_mut().push(HashSet::new());

                for child in body.iter_mut() {
                    self.visit(child)?;
                }

                let vars = match self.var_stack.borrow_mut().pop() {
                    Some(vars) => vars,
                    None => return Ok(()),
                };
                let mut affected: Vec<usize> = vars.iter().cloned().collect();
                affected.sort_unstable();
                data.affected_vars = affected;

                self.nested_if_lvl.set(lvl - 1);
                if lvl - 1 > 0 {
                    // writes inside a nested if are writes of the outer one
                    let mut stack = self.var_stack.borrow_mut();
                    if let Some(top) = stack.last_mut() {
                        for v in vars {
                            top.insert(v);
                        }
                    }
                }
                Ok(())
            }
            Node::Equal(data) | Node::Sup(data) | Node::SupEqual(data) => {
                if data.eps < 0.0 {
                    data.eps = self.default_eps;
                }
                Ok(())
            }
            Node::Assign(data) | Node::Pays(data) => self.record_write(&data.children),
            Node::For(data) => {
                self.record_write(&data.children)?;
                for child in data.children.iter_mut().skip(2) {
                    self.visit(child)?;
                }
                Ok(())
            }
            Node::Const(_) | Node::Var(_) | Node::Spot => Ok(()),
            _ => node
                .children_mut()
                .iter_mut()
                .try_for_each(|child| self.visit(child)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::lexer::Lexer;
    use crate::parsing::parser::Parser;
    use crate::visitors::varindexer::VarIndexer;

    fn prepare(script: &str) -> Vec<Node> {
        let mut nodes = Parser::new(Lexer::new(script).tokenize().unwrap())
            .parse()
            .unwrap();
        let indexer = VarIndexer::new();
        nodes.iter_mut().for_each(|n| indexer.visit(n).unwrap());
        nodes
    }

    #[test]
    fn nested_write_sets_roll_up() {
        let mut nodes = prepare(
            "x = 0 \
             if x = 0 then y = 1 if y = 1 then z = 2 endif w = 3 endif",
        );
        let processor = IfProcessor::new();
        nodes.iter_mut().for_each(|n| processor.visit(n).unwrap());

        let outer = match &nodes[1] {
            Node::If(data) => data,
            other => panic!("expected if, got {:?}", other),
        };
        // slots: x=0, y=1, z=2, w=3
        assert_eq!(outer.affected_vars, vec![1, 2, 3]);

        let inner = match &outer.children[2] {
            Node::If(data) => data,
            other => panic!("expected nested if, got {:?}", other),
        };
        assert_eq!(inner.affected_vars, vec![2]);
        assert_eq!(processor.max_nested_ifs(), 2);
    }

    #[test]
    fn pays_targets_are_part_of_the_write_set() {
        let mut nodes = prepare("if spot > 100 then opt PAYS spot - 100 endif");
        let processor = IfProcessor::new();
        nodes.iter_mut().for_each(|n| processor.visit(n).unwrap());
        match &nodes[0] {
            Node::If(data) => assert_eq!(data.affected_vars, vec![0]),
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn default_eps_fills_unannotated_conditions_only() {
        let mut nodes =
            prepare("if spot > 100 then y = 1 endif if spot > 100 ;0.25 then z = 1 endif");
        let processor = IfProcessor::new().with_default_eps(1.0);
        nodes.iter_mut().for_each(|n| processor.visit(n).unwrap());

        let eps_of = |node: &Node| match node {
            Node::If(data) => match &data.children[0] {
                Node::Sup(cond) => cond.eps,
                other => panic!("expected sup, got {:?}", other),
            },
            other => panic!("expected if, got {:?}", other),
        };
        assert_eq!(eps_of(&nodes[0]), 1.0);
        assert_eq!(eps_of(&nodes[1]), 0.25);
    }
}
