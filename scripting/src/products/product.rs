use std::collections::HashMap;

use adkit::scalar::Scalar;
use rayon::prelude::*;

use crate::nodes::event::{CodedEvent, EventStream};
use crate::scenario::{uniform_scenario, Scenario};
use crate::utils::errors::{Result, ScriptingError};
use crate::visitors::evaluator::{Evaluator, PathEvaluator};
use crate::visitors::fuzzyevaluator::FuzzyEvaluator;
use crate::visitors::ifprocessor::IfProcessor;
use crate::visitors::varindexer::VarIndexer;

/// # Product
/// Facade over the whole pipeline: parse the dated scripts, index the
/// variables, optionally pre-process the conditionals, then drive an
/// evaluator through the events in ascending date order.
pub struct Product {
    events: EventStream,
    variables: Vec<String>,
    var_indexes: HashMap<String, usize>,
    indexed: bool,
    max_nested_ifs: usize,
}

impl Product {
    /// Parse every script into an event; events are kept ascending by date.
    pub fn parse_events(coded: Vec<CodedEvent>) -> Result<Self> {
        let events = EventStream::try_from(coded)?;
        Ok(Product {
            events,
            variables: Vec::new(),
            var_indexes: HashMap::new(),
            indexed: false,
            max_nested_ifs: 0,
        })
    }

    /// Assign a slot to every variable, in order of first appearance.
    pub fn index_variables(&mut self) -> Result<()> {
        let indexer = VarIndexer::new();
        indexer.visit_events(&mut self.events)?;
        self.variables = indexer.var_names();
        self.var_indexes = indexer.get_variable_indexes();
        self.indexed = true;
        Ok(())
    }

    /// Index, then prepare conditionals. With `fuzzy` set, comparisons
    /// without a script-level width receive `default_eps`.
    pub fn pre_process(&mut self, fuzzy: bool, default_eps: f64) -> Result<()> {
        self.index_variables()?;
        let processor = if fuzzy {
            IfProcessor::new().with_default_eps(default_eps)
        } else {
            IfProcessor::new()
        };
        processor.visit_events(&mut self.events)?;
        self.max_nested_ifs = processor.max_nested_ifs();
        Ok(())
    }

    pub fn events(&self) -> &EventStream {
        &self.events
    }

    pub fn n_events(&self) -> usize {
        self.events.events().len()
    }

    /// Variable names by slot.
    pub fn var_names(&self) -> &[String] {
        &self.variables
    }

    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.var_indexes.get(name).cloned()
    }

    pub fn max_nested_ifs(&self) -> usize {
        self.max_nested_ifs
    }

    /// Mock path: one sample per event, spot 100, numeraire 1.
    pub fn build_scenario<T: Scalar>(&self) -> Scenario<T> {
        uniform_scenario(self.n_events(), 100.0, 1.0)
    }

    pub fn build_evaluator<'a, T: Scalar>(&self) -> Evaluator<'a, T> {
        Evaluator::new().with_variables(self.variables.len())
    }

    pub fn build_fuzzy_evaluator<'a, T: Scalar>(&self, eps: f64) -> FuzzyEvaluator<'a, T> {
        FuzzyEvaluator::new()
            .with_eps(eps)
            .with_variables(self.variables.len())
    }

    /// Run the evaluator through every event, ascending by date.
    pub fn evaluate<V: PathEvaluator>(&self, evaluator: &V) -> Result<()> {
        if !self.indexed {
            return Err(ScriptingError::Evaluation(
                "product is not indexed".to_string(),
            ));
        }
        evaluator.ensure_ready(self.n_events())?;
        for (index, event) in self.events.events().iter().enumerate() {
            evaluator.set_current_event(index);
            for statement in event.statements() {
                evaluator.const_visit(statement)?;
            }
        }
        Ok(())
    }

    /// Price a batch of scenarios in parallel, one plain-valued evaluator
    /// per task. Returns the final variable vector of each scenario.
    pub fn price_scenarios(&self, scenarios: &[Scenario<f64>]) -> Result<Vec<Vec<f64>>> {
        scenarios
            .par_iter()
            .map(|scenario| {
                let evaluator = self.build_evaluator::<f64>().with_scenario(scenario);
                self.evaluate(&evaluator)?;
                Ok(evaluator.variables())
            })
            .collect()
    }
}
