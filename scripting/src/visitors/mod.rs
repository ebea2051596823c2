pub mod debugger;
pub mod evaluator;
pub mod fuzzyevaluator;
pub mod ifprocessor;
pub mod varindexer;
