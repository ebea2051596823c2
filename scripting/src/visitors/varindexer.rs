use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use log::warn;

use crate::nodes::event::EventStream;
use crate::nodes::node::Node;
use crate::nodes::traits::NodeVisitor;
use crate::utils::errors::{Result, ScriptingError};

/// # VarIndexer
/// Walks all statements and assigns a dense slot to each distinct variable
/// name, in order of first appearance; the slot is written back into every
/// `Var` node so evaluation never looks names up. A variable whose first
/// appearance is a read is flagged: it evaluates as zero.
pub struct VarIndexer {
    variables: RefCell<HashMap<String, usize>>,
    names: RefCell<Vec<String>>,
    written: RefCell<HashSet<usize>>,
}

impl VarIndexer {
    pub fn new() -> Self {
        VarIndexer {
            variables: RefCell::new(HashMap::new()),
            names: RefCell::new(Vec::new()),
            written: RefCell::new(HashSet::new()),
        }
    }

    fn slot(&self, name: &str) -> usize {
        let mut variables = self.variables.borrow_mut();
        if let Some(&index) = variables.get(name) {
            index
        } else {
            let index = variables.len();
            variables.insert(name.to_string(), index);
            self.names.borrow_mut().push(name.to_string());
            index
        }
    }

    fn visit_write_target(&self, node: &mut Node) -> Result<()> {
        match node {
            Node::Var(data) => {
                let index = self.slot(&data.name);
                data.index = Some(index);
                self.written.borrow_mut().insert(index);
                Ok(())
            }
            _ => Err(ScriptingError::Syntax(
                "assignment target must be a variable".to_string(),
            )),
        }
    }

    pub fn get_variable_index(&self, name: &str) -> Option<usize> {
        self.variables.borrow().get(name).cloned()
    }

    pub fn get_variable_name(&self, index: usize) -> Option<String> {
        self.names.borrow().get(index).cloned()
    }

    /// Names in slot order.
    pub fn var_names(&self) -> Vec<String> {
        self.names.borrow().clone()
    }

    pub fn get_variable_indexes(&self) -> HashMap<String, usize> {
        self.variables.borrow().clone()
    }

    pub fn get_variables_size(&self) -> usize {
        self.variables.borrow().len()
    }

    pub fn visit_events(&self, events: &mut EventStream) -> Result<()> {
        events.mut_events().iter_mut().try_for_each(|event| {
            event
                .mut_statements()
                .iter_mut()
                .try_for_each(|statement| self.visit(statement))
        })
    }
}

impl NodeVisitor for VarIndexer {
    type Output = Result<()>;

    fn visit(&self, node: &mut Node) -> Self::Output {
        match node {
            Node::Var(data) => {
                let fresh = !self.variables.borrow().contains_key(&data.name);
                let index = self.slot(&data.name);
                if fresh && !self.written.borrow().contains(&index) {
                    warn!(
                        "variable {} is read before any assignment; it evaluates as 0",
                        data.name
                    );
                }
                data.index = Some(index);
                Ok(())
            }
            Node::Assign(data) | Node::Pays(data) => {
                if let Some((target, rest)) = data.children.split_first_mut() {
                    self.visit_write_target(target)?;
                    rest.iter_mut().try_for_each(|child| self.visit(child))?;
                }
                Ok(())
            }
            Node::For(data) => {
                if let Some((target, rest)) = data.children.split_first_mut() {
                    self.visit_write_target(target)?;
                    rest.iter_mut().try_for_each(|child| self.visit(child))?;
                }
                Ok(())
            }
            Node::Const(_) | Node::Spot => Ok(()),
            _ => node
                .children_mut()
                .iter_mut()
                .try_for_each(|child| self.visit(child)),
        }
    }
}
