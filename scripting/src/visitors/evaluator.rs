use std::cell::{Cell, RefCell};

use adkit::scalar::Scalar;

use crate::nodes::node::{Node, NodeData, VarData};
use crate::nodes::traits::NodeConstVisitor;
use crate::scenario::{Sample, Scenario};
use crate::utils::errors::{Result, ScriptingError};

/// Evaluator driven event by event over one scenario.
pub trait PathEvaluator: NodeConstVisitor<Output = Result<()>> {
    fn set_current_event(&self, index: usize);

    /// Once-per-evaluation preconditions.
    fn ensure_ready(&self, n_events: usize) -> Result<()>;
}

/// # Evaluator
/// Visitor that evaluates the statements of a product over one scenario.
///
/// Expressions follow a post-order protocol: visiting a node first evaluates
/// its children, which push their values onto the scratch stack; the node
/// then pops its operands and pushes one result. Conditions go through a
/// separate boolean stack. The scalar `T` is either `f64` or the
/// tape-recording number; in the latter case every operation below lands on
/// the tape as a side effect.
pub struct Evaluator<'a, T: Scalar> {
    pub(crate) variables: RefCell<Vec<T>>,
    digit_stack: RefCell<Vec<T>>,
    boolean_stack: RefCell<Vec<bool>>,
    scenario: Option<&'a Scenario<T>>,
    current_event: Cell<usize>,
}

impl<'a, T: Scalar> Evaluator<'a, T> {
    pub fn new() -> Self {
        Evaluator {
            variables: RefCell::new(Vec::new()),
            digit_stack: RefCell::new(Vec::new()),
            boolean_stack: RefCell::new(Vec::new()),
            scenario: None,
            current_event: Cell::new(0),
        }
    }

    pub fn with_variables(self, n: usize) -> Self {
        self.init(n);
        self
    }

    pub fn with_scenario(mut self, scenario: &'a Scenario<T>) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Zero-fill the variable store and clear the scratch stacks.
    pub fn init(&self, n_vars: usize) {
        let mut variables = self.variables.borrow_mut();
        variables.clear();
        variables.resize(n_vars, T::from(0.0));
        self.digit_stack.borrow_mut().clear();
        self.boolean_stack.borrow_mut().clear();
    }

    pub fn variables(&self) -> Vec<T> {
        self.variables.borrow().clone()
    }

    pub fn variable(&self, index: usize) -> Option<T> {
        self.variables.borrow().get(index).copied()
    }

    pub fn set_variable(&self, index: usize, value: T) {
        let mut variables = self.variables.borrow_mut();
        if index >= variables.len() {
            variables.resize(index + 1, T::from(0.0));
        }
        variables[index] = value;
    }

    pub fn current_event(&self) -> usize {
        self.current_event.get()
    }

    /* ── scratch-stack helpers ──────────────────────────────────────── */

    pub(crate) fn push_value(&self, value: T) {
        self.digit_stack.borrow_mut().push(value);
    }

    pub(crate) fn pop_value(&self) -> Result<T> {
        self.digit_stack
            .borrow_mut()
            .pop()
            .ok_or(ScriptingError::Underflow("value"))
    }

    fn pop_bool(&self) -> Result<bool> {
        self.boolean_stack
            .borrow_mut()
            .pop()
            .ok_or(ScriptingError::Underflow("boolean"))
    }

    fn push_bool(&self, value: bool) {
        self.boolean_stack.borrow_mut().push(value);
    }

    fn sample(&self) -> Result<&'a Sample<T>> {
        self.scenario
            .ok_or_else(|| ScriptingError::Evaluation("no scenario set".to_string()))?
            .get(self.current_event.get())
            .ok_or_else(|| {
                ScriptingError::Evaluation("event index out of range".to_string())
            })
    }

    fn visit_children(&self, data: &NodeData) -> Result<()> {
        data.children
            .iter()
            .try_for_each(|child| self.const_visit(child))
    }

    /// Slot of the variable in write position (`children[0]`).
    pub(crate) fn target(children: &[Node]) -> Result<usize> {
        match children.first() {
            Some(Node::Var(data)) => Self::var_index(data),
            _ => Err(ScriptingError::Evaluation(
                "assignment target must be a variable".to_string(),
            )),
        }
    }

    fn var_index(data: &VarData) -> Result<usize> {
        data.index.ok_or_else(|| {
            ScriptingError::Evaluation(format!("Variable {} not indexed", data.name))
        })
    }

    /// Evaluate an iterable expression into the sequence of values it
    /// pushes (every element of a list, or the single value otherwise).
    pub(crate) fn take_values(&self, expr: &Node) -> Result<Vec<T>> {
        let before = self.digit_stack.borrow().len();
        self.const_visit(expr)?;
        let mut stack = self.digit_stack.borrow_mut();
        Ok(stack.split_off(before))
    }

    pub(crate) fn store(&self, index: usize, value: T) -> Result<()> {
        let mut variables = self.variables.borrow_mut();
        let slot = variables.get_mut(index).ok_or_else(|| {
            ScriptingError::Evaluation("variable slot out of range".to_string())
        })?;
        *slot = value;
        Ok(())
    }

    fn binary_op(&self, data: &NodeData, op: impl FnOnce(T, T) -> T) -> Result<()> {
        self.visit_children(data)?;
        let rhs = self.pop_value()?;
        let lhs = self.pop_value()?;
        self.push_value(op(lhs, rhs));
        Ok(())
    }

    fn unary_op(&self, data: &NodeData, op: impl FnOnce(T) -> T) -> Result<()> {
        self.visit_children(data)?;
        let value = self.pop_value()?;
        self.push_value(op(value));
        Ok(())
    }

    /// N-ary fold in argument order.
    fn fold_op(&self, data: &NodeData, op: impl Fn(T, T) -> T) -> Result<()> {
        self.visit_children(data)?;
        let mut stack = self.digit_stack.borrow_mut();
        let n = data.children.len();
        if stack.len() < n || n == 0 {
            return Err(ScriptingError::Underflow("value"));
        }
        let len = stack.len();
        let values = stack.split_off(len - n);
        let mut iter = values.into_iter();
        let mut acc = iter.next().ok_or(ScriptingError::Underflow("value"))?;
        for value in iter {
            acc = op(acc, value);
        }
        stack.push(acc);
        Ok(())
    }

    /// Strict comparison of the canonical `expr <cmp> 0` form.
    fn compare(&self, children: &[Node], op: impl FnOnce(f64) -> bool) -> Result<()> {
        children
            .iter()
            .try_for_each(|child| self.const_visit(child))?;
        let value = self.pop_value()?;
        self.push_bool(op(value.primal()));
        Ok(())
    }
}

impl<'a, T: Scalar> NodeConstVisitor for Evaluator<'a, T> {
    type Output = Result<()>;

    fn const_visit(&self, node: &Node) -> Self::Output {
        match node {
            /* ── leaves ── */
            Node::Const(value) => {
                self.push_value(T::from(*value));
                Ok(())
            }
            Node::Var(data) => {
                let index = Self::var_index(data)?;
                let value = self.variable(index).ok_or_else(|| {
                    ScriptingError::Evaluation("variable slot out of range".to_string())
                })?;
                self.push_value(value);
                Ok(())
            }
            Node::Spot => {
                let sample = self.sample()?;
                self.push_value(sample.spot);
                Ok(())
            }

            /* ── arithmetic ── */
            Node::Add(data) => self.binary_op(data, |l, r| l + r),
            Node::Sub(data) => self.binary_op(data, |l, r| l - r),
            Node::Mult(data) => self.binary_op(data, |l, r| l * r),
            Node::Div(data) => self.binary_op(data, |l, r| l / r),
            Node::Pow(data) => self.binary_op(data, |l, r| l.powf(r)),
            Node::Uplus(data) => self.visit_children(data),
            Node::Uminus(data) => self.unary_op(data, |v| -v),
            Node::Log(data) => self.unary_op(data, |v| v.ln()),
            Node::Sqrt(data) => self.unary_op(data, |v| v.sqrt()),
            Node::Min(data) => self.fold_op(data, |l, r| l.min(r)),
            Node::Max(data) => self.fold_op(data, |l, r| l.max(r)),
            Node::Smooth(data) => {
                self.visit_children(data)?;
                let eps = self.pop_value()?;
                let b = self.pop_value()?;
                let a = self.pop_value()?;
                let x = self.pop_value()?;
                let half = eps * 0.5;
                let t = (x + half).min(eps).max(T::from(0.0));
                self.push_value(b + (a - b) * t / eps);
                Ok(())
            }
            Node::List(data) => self.visit_children(data),

            /* ── conditions (strict) ── */
            Node::Equal(data) => self.compare(&data.children, |x| x == 0.0),
            Node::Sup(data) => self.compare(&data.children, |x| x > 0.0),
            Node::SupEqual(data) => self.compare(&data.children, |x| x >= 0.0),
            Node::Not(data) => {
                self.visit_children(data)?;
                let value = self.pop_bool()?;
                self.push_bool(!value);
                Ok(())
            }
            Node::And(data) => {
                self.visit_children(data)?;
                let rhs = self.pop_bool()?;
                let lhs = self.pop_bool()?;
                self.push_bool(lhs && rhs);
                Ok(())
            }
            Node::Or(data) => {
                self.visit_children(data)?;
                let rhs = self.pop_bool()?;
                let lhs = self.pop_bool()?;
                self.push_bool(lhs || rhs);
                Ok(())
            }

            /* ── statements ── */
            Node::Assign(data) => {
                let target = Self::target(&data.children)?;
                let expr = data.children.get(1).ok_or_else(|| {
                    ScriptingError::Evaluation("malformed assignment".to_string())
                })?;
                self.const_visit(expr)?;
                let value = self.pop_value()?;
                self.store(target, value)
            }
            Node::Pays(data) => {
                let target = Self::target(&data.children)?;
                let expr = data.children.get(1).ok_or_else(|| {
                    ScriptingError::Evaluation("malformed pays".to_string())
                })?;
                self.const_visit(expr)?;
                let value = self.pop_value()?;
                let numeraire = self.sample()?.numeraire;
                let mut variables = self.variables.borrow_mut();
                let slot = variables.get_mut(target).ok_or_else(|| {
                    ScriptingError::Evaluation("variable slot out of range".to_string())
                })?;
                *slot += value / numeraire;
                Ok(())
            }
            Node::If(data) => {
                self.const_visit(&data.children[0])?;
                let is_true = self.pop_bool()?;
                let last_then = data.first_else.unwrap_or(data.children.len());
                if is_true {
                    data.children[1..last_then]
                        .iter()
                        .try_for_each(|child| self.const_visit(child))
                } else if let Some(first_else) = data.first_else {
                    data.children[first_else..]
                        .iter()
                        .try_for_each(|child| self.const_visit(child))
                } else {
                    Ok(())
                }
            }
            Node::For(data) => {
                let target = Self::target(&data.children)?;
                let iterable = data.children.get(1).ok_or_else(|| {
                    ScriptingError::Evaluation("malformed for loop".to_string())
                })?;
                let sequence = self.take_values(iterable)?;
                for value in sequence {
                    self.store(target, value)?;
                    data.children[2..]
                        .iter()
                        .try_for_each(|child| self.const_visit(child))?;
                }
                Ok(())
            }
        }
    }
}

impl<'a, T: Scalar> PathEvaluator for Evaluator<'a, T> {
    fn set_current_event(&self, index: usize) {
        self.current_event.set(index);
    }

    fn ensure_ready(&self, n_events: usize) -> Result<()> {
        if let Some(scenario) = self.scenario {
            if scenario.len() < n_events {
                return Err(ScriptingError::Evaluation(format!(
                    "scenario has {} samples for {} events",
                    scenario.len(),
                    n_events
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adkit::number::Number;
    use adkit::tape::Tape;

    use crate::nodes::traits::NodeVisitor;
    use crate::parsing::lexer::Lexer;
    use crate::parsing::parser::Parser;
    use crate::scenario::uniform_scenario;
    use crate::visitors::varindexer::VarIndexer;

    fn compile(script: &str) -> (Vec<Node>, VarIndexer) {
        let mut nodes = Parser::new(Lexer::new(script).tokenize().unwrap())
            .parse()
            .unwrap();
        let indexer = VarIndexer::new();
        nodes.iter_mut().for_each(|n| indexer.visit(n).unwrap());
        (nodes, indexer)
    }

    fn run<T: Scalar>(script: &str, scenario: &Scenario<T>) -> (Vec<T>, VarIndexer) {
        let (nodes, indexer) = compile(script);
        let evaluator = Evaluator::<T>::new()
            .with_variables(indexer.get_variables_size())
            .with_scenario(scenario);
        nodes.iter().for_each(|n| evaluator.const_visit(n).unwrap());
        (evaluator.variables(), indexer)
    }

    #[test]
    fn constant_assignment() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let (vars, indexer) = run("x = 3", &scenario);
        assert_eq!(indexer.get_variables_size(), 1);
        assert_eq!(vars[0], 3.0);
    }

    #[test]
    fn pays_divides_by_the_numeraire() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let (vars, _) = run("value PAYS spot;", &scenario);
        assert_eq!(vars[0], 100.0);

        let discounted = uniform_scenario::<f64>(1, 100.0, 2.0);
        let (vars, _) = run("value PAYS spot;", &discounted);
        assert_eq!(vars[0], 50.0);
    }

    #[test]
    fn pays_accumulates() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let (vars, _) = run("value PAYS spot value PAYS spot", &scenario);
        assert_eq!(vars[0], 200.0);
    }

    #[test]
    fn precedence_in_practice() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let (vars, _) = run("x = (2 + 3) * 4", &scenario);
        assert_eq!(vars[0], 20.0);
        let (vars, _) = run("x = 2 + 3 * 4", &scenario);
        assert_eq!(vars[0], 14.0);
        let (vars, _) = run("x = 2 ^ 3 ^ 2", &scenario);
        assert_eq!(vars[0], 64.0); // left-associative
    }

    #[test]
    fn strict_branching() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let (vars, indexer) =
            run("x = 0 if x > 0 then y = 1 else y = 0 endif", &scenario);
        assert_eq!(vars[indexer.get_variable_index("Y").unwrap()], 0.0);

        let (vars, indexer) =
            run("x = 1 if x > 0 then y = 1 else y = 0 endif", &scenario);
        assert_eq!(vars[indexer.get_variable_index("Y").unwrap()], 1.0);
    }

    #[test]
    fn boolean_combinators() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let script = "x = 1 y = 0 \
                      if x > 0 and y > 0 then a = 1 endif \
                      if x > 0 or y > 0 then b = 1 endif \
                      if x != 0 then c = 1 endif \
                      if y = 0 then d = 1 endif \
                      if x >= 1 then e = 1 endif";
        let (vars, indexer) = run(script, &scenario);
        let value = |name: &str| vars[indexer.get_variable_index(name).unwrap()];
        assert_eq!(value("A"), 0.0);
        assert_eq!(value("B"), 1.0);
        assert_eq!(value("C"), 1.0);
        assert_eq!(value("D"), 1.0);
        assert_eq!(value("E"), 1.0);
    }

    #[test]
    fn for_loop_runs_the_body_per_element() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let (vars, indexer) = run("x = 0 for i in [1, 2, 3] then x = x + i endfor", &scenario);
        assert_eq!(vars[indexer.get_variable_index("X").unwrap()], 6.0);
        assert_eq!(vars[indexer.get_variable_index("I").unwrap()], 3.0);
    }

    #[test]
    fn variadic_min_max_and_smooth() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let (vars, _) = run("x = min(3, 1, 2)", &scenario);
        assert_eq!(vars[0], 1.0);
        let (vars, _) = run("x = max(3, 1, 7, 2)", &scenario);
        assert_eq!(vars[0], 7.0);
        // digital smoothed over [-0.25, 0.25] at the money
        let (vars, _) = run("x = smooth(spot - 100, 1, 0, 0.5)", &scenario);
        assert_eq!(vars[0], 0.5);
    }

    #[test]
    fn unwritten_variable_reads_as_zero() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let (vars, indexer) = run("x = y + 1", &scenario);
        assert_eq!(vars[indexer.get_variable_index("X").unwrap()], 1.0);
        assert_eq!(vars[indexer.get_variable_index("Y").unwrap()], 0.0);
    }

    #[test]
    fn primal_agrees_between_f64_and_number() {
        let script = "x = log(spot) + sqrt(spot) * 2 - spot / 4 \
                      y = max(spot - 100, 0) + smooth(spot - 100, 1, 0, 0.5)";
        let plain = uniform_scenario::<f64>(1, 104.0, 1.0);
        let (expected, _) = run(script, &plain);

        Tape::reset();
        let taped = uniform_scenario::<Number>(1, 104.0, 1.0);
        let (got, _) = run(script, &taped);
        for (g, e) in got.iter().zip(expected.iter()) {
            assert_eq!(g.value(), *e);
        }
    }

    #[test]
    fn log_sqrt_risk_at_spot_four() {
        // x = log(spot) + sqrt(spot), spot = 4: x = log 4 + 2, dx/dspot = 0.5
        Tape::reset();
        let scenario = uniform_scenario::<Number>(1, 4.0, 1.0);
        let (nodes, indexer) = compile("x = log(spot) + sqrt(spot)");
        let evaluator = Evaluator::<Number>::new()
            .with_variables(indexer.get_variables_size())
            .with_scenario(&scenario);
        nodes.iter().for_each(|n| evaluator.const_visit(n).unwrap());

        let x = evaluator.variable(0).unwrap();
        assert!((x.value() - (4.0_f64.ln() + 2.0)).abs() < 1e-12);
        x.propagate_to_start();
        assert!((scenario[0].spot.adjoint() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn constant_expression_has_zero_spot_sensitivity() {
        Tape::reset();
        let scenario = uniform_scenario::<Number>(1, 100.0, 1.0);
        let (nodes, indexer) = compile("x = (2 + 3) * 4");
        let evaluator = Evaluator::<Number>::new()
            .with_variables(indexer.get_variables_size())
            .with_scenario(&scenario);
        nodes.iter().for_each(|n| evaluator.const_visit(n).unwrap());
        let x = evaluator.variable(0).unwrap();
        assert_eq!(x.value(), 20.0);
        x.propagate_to_start();
        assert_eq!(scenario[0].spot.adjoint(), 0.0);
    }

    #[test]
    fn missing_scenario_is_an_evaluation_error() {
        let (nodes, indexer) = compile("value PAYS spot");
        let evaluator =
            Evaluator::<f64>::new().with_variables(indexer.get_variables_size());
        let err = nodes
            .iter()
            .try_for_each(|n| evaluator.const_visit(n))
            .unwrap_err();
        assert!(matches!(err, ScriptingError::Evaluation(_)));
    }

    #[test]
    fn unindexed_tree_is_an_evaluation_error() {
        let nodes = Parser::new(Lexer::new("x = 1").tokenize().unwrap())
            .parse()
            .unwrap();
        let evaluator = Evaluator::<f64>::new().with_variables(1);
        let err = nodes
            .iter()
            .try_for_each(|n| evaluator.const_visit(n))
            .unwrap_err();
        assert!(matches!(err, ScriptingError::Evaluation(_)));
    }
}
