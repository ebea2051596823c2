use std::cell::{Cell, RefCell};

use adkit::scalar::Scalar;

use crate::nodes::node::{CondData, Node};
use crate::nodes::traits::NodeConstVisitor;
use crate::scenario::Scenario;
use crate::utils::errors::{Result, ScriptingError};
use crate::visitors::evaluator::{Evaluator, PathEvaluator};

const EPS: f64 = 1.0e-12;
const ONE_MINUS_EPS: f64 = 1.0 - 1.0e-12;

/// # FuzzyEvaluator
/// Evaluator that replaces strict branching with smoothed indicators so that
/// conditions contribute continuous, non-zero gradients under AAD.
///
/// Conditions produce a degree of truth instead of a boolean: `x > 0`
/// becomes a call-spread over `[-eps/2, eps/2]`, `x = 0` a butterfly of base
/// `eps`, `and`/`or` the product and probabilistic sum. An `if` statement
/// evaluates both branches and blends every written variable by the degree
/// of truth; the write-sets come from the if-processor.
pub struct FuzzyEvaluator<'a, T: Scalar> {
    base: Evaluator<'a, T>,

    /// Stack of truth degrees produced while evaluating conditions.
    dt_stack: RefCell<Vec<T>>,

    /// Default smoothing width when a node carries no override.
    eps: f64,

    /// Branch snapshots per nested-if level: the values on entry and the
    /// values after the then-branch.
    var_store0: RefCell<Vec<Vec<T>>>,
    var_store1: RefCell<Vec<Vec<T>>>,

    /// Current nested-if depth (0 = outside any `if`).
    nested_if_lvl: Cell<usize>,
}

impl<'a, T: Scalar> FuzzyEvaluator<'a, T> {
    pub fn new() -> Self {
        Self {
            base: Evaluator::new(),
            dt_stack: RefCell::new(Vec::new()),
            eps: 0.0,
            var_store0: RefCell::new(Vec::new()),
            var_store1: RefCell::new(Vec::new()),
            nested_if_lvl: Cell::new(0),
        }
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_scenario(mut self, scenario: &'a Scenario<T>) -> Self {
        self.base = self.base.with_scenario(scenario);
        self
    }

    pub fn with_variables(self, n: usize) -> Self {
        self.base.init(n);
        self
    }

    pub fn variables(&self) -> Vec<T> {
        self.base.variables()
    }

    pub fn variable(&self, index: usize) -> Option<T> {
        self.base.variable(index)
    }

    /* ── smoothing primitives ───────────────────────────────────────── */

    /// Call-spread centred on 0, width `eps`: 0 below −eps/2, 1 above +eps/2.
    fn call_spread(x: T, eps: f64) -> T {
        (x + eps * 0.5).min(T::from(eps)).max(T::from(0.0)) / eps
    }

    /// Butterfly centred on 0, base `eps`: triangular peak of height 1.
    fn butterfly(x: T, eps: f64) -> T {
        let half = eps * 0.5;
        (T::from(half) - x.abs()).max(T::from(0.0)) / half
    }

    /// Effective smoothing width for a condition node.
    fn width(&self, data: &CondData) -> f64 {
        if data.eps >= 0.0 {
            data.eps
        } else {
            self.eps
        }
    }

    /// Evaluate a comparison child expression through the base evaluator.
    fn operand(&self, data: &CondData) -> Result<T> {
        data.children
            .iter()
            .try_for_each(|child| self.base.const_visit(child))?;
        self.base.pop_value()
    }

    fn push_dt(&self, dt: T) {
        self.dt_stack.borrow_mut().push(dt);
    }

    fn pop_dt(&self) -> Result<T> {
        self.dt_stack
            .borrow_mut()
            .pop()
            .ok_or(ScriptingError::Underflow("truth"))
    }

    /// Grow the per-level snapshot stores up to the current depth. Called
    /// after the level is incremented.
    fn ensure_level(&self) {
        let lvl = self.nested_if_lvl.get();
        let n_vars = self.base.variables.borrow().len();
        let mut store0 = self.var_store0.borrow_mut();
        while store0.len() < lvl {
            store0.push(vec![T::from(0.0); n_vars]);
        }
        drop(store0);
        let mut store1 = self.var_store1.borrow_mut();
        while store1.len() < lvl {
            store1.push(vec![T::from(0.0); n_vars]);
        }
    }
}

impl<'a, T: Scalar> NodeConstVisitor for FuzzyEvaluator<'a, T> {
    type Output = Result<()>;

    fn const_visit(&self, node: &Node) -> Self::Output {
        match node {
            /* ── comparisons ── */
            Node::Equal(data) => {
                let x = self.operand(data)?;
                let eps = self.width(data);
                let dt = if eps > 0.0 {
                    Self::butterfly(x, eps)
                } else if x.primal() == 0.0 {
                    T::from(1.0)
                } else {
                    T::from(0.0)
                };
                self.push_dt(dt);
                Ok(())
            }
            Node::Sup(data) => {
                let x = self.operand(data)?;
                let eps = self.width(data);
                let dt = if eps > 0.0 {
                    Self::call_spread(x, eps)
                } else if x.primal() > 0.0 {
                    T::from(1.0)
                } else {
                    T::from(0.0)
                };
                self.push_dt(dt);
                Ok(())
            }
            Node::SupEqual(data) => {
                let x = self.operand(data)?;
                let eps = self.width(data);
                let dt = if eps > 0.0 {
                    Self::call_spread(x, eps)
                } else if x.primal() >= 0.0 {
                    T::from(1.0)
                } else {
                    T::from(0.0)
                };
                self.push_dt(dt);
                Ok(())
            }

            /* ── combinators ── */
            Node::Not(data) => {
                data.children
                    .iter()
                    .try_for_each(|child| self.const_visit(child))?;
                let dt = self.pop_dt()?;
                self.push_dt(T::from(1.0) - dt);
                Ok(())
            }
            Node::And(data) => {
                data.children
                    .iter()
                    .try_for_each(|child| self.const_visit(child))?;
                let rhs = self.pop_dt()?;
                let lhs = self.pop_dt()?;
                self.push_dt(lhs * rhs);
                Ok(())
            }
            Node::Or(data) => {
                data.children
                    .iter()
                    .try_for_each(|child| self.const_visit(child))?;
                let rhs = self.pop_dt()?;
                let lhs = self.pop_dt()?;
                self.push_dt(lhs + rhs - lhs * rhs);
                Ok(())
            }

            /* ── if / else ── */
            Node::If(data) => {
                self.nested_if_lvl.set(self.nested_if_lvl.get() + 1);
                self.ensure_level();

                let last_then = data.first_else.unwrap_or(data.children.len());
                self.const_visit(&data.children[0])?;
                let dt = self.pop_dt()?;
                let degree = dt.primal();

                if degree > ONE_MINUS_EPS {
                    // all weight on the then-branch
                    data.children[1..last_then]
                        .iter()
                        .try_for_each(|child| self.const_visit(child))?;
                } else if degree < EPS {
                    if let Some(first_else) = data.first_else {
                        data.children[first_else..]
                            .iter()
                            .try_for_each(|child| self.const_visit(child))?;
                    }
                } else {
                    let lvl = self.nested_if_lvl.get() - 1;

                    // snapshot the write-set on entry
                    {
                        let mut store0 = self.var_store0.borrow_mut();
                        let variables = self.base.variables.borrow();
                        for &index in &data.affected_vars {
                            store0[lvl][index] = variables[index];
                        }
                    }

                    data.children[1..last_then]
                        .iter()
                        .try_for_each(|child| self.const_visit(child))?;

                    // record the then-results, restore the entry state
                    {
                        let store0 = self.var_store0.borrow();
                        let mut store1 = self.var_store1.borrow_mut();
                        let mut variables = self.base.variables.borrow_mut();
                        for &index in &data.affected_vars {
                            store1[lvl][index] = variables[index];
                            variables[index] = store0[lvl][index];
                        }
                    }

                    if let Some(first_else) = data.first_else {
                        data.children[first_else..]
                            .iter()
                            .try_for_each(|child| self.const_visit(child))?;
                    }

                    // blend both branches by the degree of truth
                    {
                        let store1 = self.var_store1.borrow();
                        let mut variables = self.base.variables.borrow_mut();
                        for &index in &data.affected_vars {
                            let if_true = store1[lvl][index];
                            let if_false = variables[index];
                            variables[index] =
                                dt * if_true + (T::from(1.0) - dt) * if_false;
                        }
                    }
                }

                self.nested_if_lvl.set(self.nested_if_lvl.get() - 1);
                Ok(())
            }

            /* ── loops re-dispatch their body through this visitor, so a
            nested `if` still blends ── */
            Node::For(data) => {
                let target = Evaluator::<T>::target(&data.children)?;
                let iterable = data.children.get(1).ok_or_else(|| {
                    ScriptingError::Evaluation("malformed for loop".to_string())
                })?;
                let sequence = self.base.take_values(iterable)?;
                for value in sequence {
                    self.base.store(target, value)?;
                    data.children[2..]
                        .iter()
                        .try_for_each(|child| self.const_visit(child))?;
                }
                Ok(())
            }

            /* ── everything else runs strict ── */
            _ => self.base.const_visit(node),
        }
    }
}

impl<'a, T: Scalar> PathEvaluator for FuzzyEvaluator<'a, T> {
    fn set_current_event(&self, index: usize) {
        self.base.set_current_event(index);
    }

    fn ensure_ready(&self, n_events: usize) -> Result<()> {
        self.base.ensure_ready(n_events)
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
    use crate::visitors::ifprocessor::IfProcessor;
    use crate::visitors::varindexer::VarIndexer;

    fn compile(script: &str, default_eps: f64) -> (Vec<Node>, VarIndexer) {
        let mut nodes = Parser::new(Lexer::new(script).tokenize().unwrap())
            .parse()
            .unwrap();
        let indexer = VarIndexer::new();
        nodes.iter_mut().for_each(|n| indexer.visit(n).unwrap());
        let processor = IfProcessor::new().with_default_eps(default_eps);
        nodes.iter_mut().for_each(|n| processor.visit(n).unwrap());
        (nodes, indexer)
    }

    fn run_fuzzy(script: &str, eps: f64, scenario: &Scenario<f64>) -> (Vec<f64>, VarIndexer) {
        let (nodes, indexer) = compile(script, -1.0);
        let evaluator = FuzzyEvaluator::<f64>::new()
            .with_eps(eps)
            .with_variables(indexer.get_variables_size())
            .with_scenario(scenario);
        nodes.iter().for_each(|n| evaluator.const_visit(n).unwrap());
        (evaluator.variables(), indexer)
    }

    #[test]
    fn plain_statements_run_strict() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let (vars, _) = run_fuzzy("x = 1 y = x + 2", 1.0, &scenario);
        assert_eq!(vars, vec![1.0, 3.0]);
    }

    #[test]
    fn interior_point_blends_the_branches() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        // spot is exactly at the barrier: half weight on each branch
        let (vars, indexer) = run_fuzzy(
            "y = 0 if spot > 100 ;0.5 then y = 1 else y = 0 endif",
            0.0,
            &scenario,
        );
        assert_eq!(vars[indexer.get_variable_index("Y").unwrap()], 0.5);
    }

    #[test]
    fn saturated_condition_shortcuts_to_one_branch() {
        let scenario = uniform_scenario::<f64>(1, 120.0, 1.0);
        let (vars, indexer) = run_fuzzy(
            "y = 0 if spot > 100 ;0.5 then y = 1 else y = 0 endif",
            0.0,
            &scenario,
        );
        assert_eq!(vars[indexer.get_variable_index("Y").unwrap()], 1.0);
    }

    #[test]
    fn smoothed_digital_risk_is_one_over_eps() {
        Tape::reset();
        let scenario = uniform_scenario::<Number>(1, 100.0, 1.0);
        let (nodes, indexer) = compile(
            "y = 0 if spot > 100 ;0.5 then y = 1 else y = 0 endif",
            -1.0,
        );
        let evaluator = FuzzyEvaluator::<Number>::new()
            .with_variables(indexer.get_variables_size())
            .with_scenario(&scenario);
        nodes.iter().for_each(|n| evaluator.const_visit(n).unwrap());

        let y = evaluator
            .variable(indexer.get_variable_index("Y").unwrap())
            .unwrap();
        assert!((y.value() - 0.5).abs() < 1e-12);
        y.propagate_to_start();
        assert!((scenario[0].spot.adjoint() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn strict_digital_has_zero_gradient() {
        Tape::reset();
        let scenario = uniform_scenario::<Number>(1, 100.0, 1.0);
        let (nodes, indexer) = compile("y = 0 if spot > 100 then y = 1 else y = 0 endif", -1.0);
        let evaluator = FuzzyEvaluator::<Number>::new()
            .with_variables(indexer.get_variables_size())
            .with_scenario(&scenario);
        nodes.iter().for_each(|n| evaluator.const_visit(n).unwrap());

        let y = evaluator
            .variable(indexer.get_variable_index("Y").unwrap())
            .unwrap();
        y.propagate_to_start();
        assert_eq!(scenario[0].spot.adjoint(), 0.0);
    }

    #[test]
    fn fuzzy_converges_to_strict_away_from_the_boundary() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let script = "x = 0.1 if x > 0 then y = 1 else y = 0 endif";
        let mut last_gap = f64::INFINITY;
        for eps in [1.0, 0.4, 0.1] {
            let (vars, indexer) = run_fuzzy(script, eps, &scenario);
            let gap = (vars[indexer.get_variable_index("Y").unwrap()] - 1.0).abs();
            assert!(gap <= last_gap);
            last_gap = gap;
        }
        // inside the band the width no longer matters
        let (vars, indexer) = run_fuzzy(script, 0.1, &scenario);
        assert_eq!(vars[indexer.get_variable_index("Y").unwrap()], 1.0);
    }

    #[test]
    fn combinators_blend_degrees_of_truth() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        // both conditions sit at their boundary: dt = 0.5 each
        let script = "y = 0 \
                      if spot > 100 ;0.5 and spot > 100 ;0.5 then y = 1 else y = 0 endif \
                      z = 0 \
                      if spot > 100 ;0.5 or spot > 100 ;0.5 then z = 1 else z = 0 endif \
                      w = 0 \
                      if spot <= 100 ;0.5 then w = 1 else w = 0 endif";
        let (vars, indexer) = run_fuzzy(script, 0.0, &scenario);
        let value = |name: &str| vars[indexer.get_variable_index(name).unwrap()];
        assert!((value("Y") - 0.25).abs() < 1e-12);
        assert!((value("Z") - 0.75).abs() < 1e-12);
        assert!((value("W") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn nested_ifs_blend_recursively() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        // outer dt = 0.5, inner dt = 0.5: y = 0.5 * (0.5 * 1) = 0.25
        let script = "y = 0 \
                      if spot > 100 ;0.5 then \
                        if spot > 100 ;0.5 then y = 1 else y = 0 endif \
                      else y = 0 endif";
        let (vars, indexer) = run_fuzzy(script, 0.0, &scenario);
        assert!((vars[indexer.get_variable_index("Y").unwrap()] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn an_if_inside_a_loop_still_blends() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        let script = "y = 0 \
                      for i in [1, 2] then \
                        if spot > 100 ;0.5 then y = y + i else y = y endif \
                      endfor";
        let (vars, indexer) = run_fuzzy(script, 0.0, &scenario);
        // each pass blends: 0.5*(y+i) + 0.5*y
        assert!((vars[indexer.get_variable_index("Y").unwrap()] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn default_width_comes_from_the_processor_or_the_evaluator() {
        let scenario = uniform_scenario::<f64>(1, 100.0, 1.0);
        // no annotation: the evaluator default applies
        let (vars, indexer) = run_fuzzy(
            "y = 0 if spot > 100 then y = 1 else y = 0 endif",
            0.5,
            &scenario,
        );
        assert_eq!(vars[indexer.get_variable_index("Y").unwrap()], 0.5);
    }
}
