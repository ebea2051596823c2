pub use crate::{
    nodes::{event::*, node::*, traits::*},
    parsing::{lexer::*, parser::*},
    products::product::*,
    scenario::*,
    utils::errors::*,
    visitors::{
        debugger::*, evaluator::*, fuzzyevaluator::*, ifprocessor::*, varindexer::*,
    },
};
