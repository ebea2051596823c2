use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::nodes::node::Node;
use crate::parsing::lexer::Lexer;
use crate::parsing::parser::Parser;
use crate::utils::errors::{Result, ScriptingError};

/// # CodedEvent
/// A coded event pairs a reference date with the raw script text. It is the
/// serializable, not-yet-compiled form of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodedEvent {
    event_date: NaiveDate,
    script: String,
}

impl CodedEvent {
    pub fn new(event_date: NaiveDate, script: impl Into<String>) -> CodedEvent {
        CodedEvent {
            event_date,
            script: script.into(),
        }
    }

    pub fn event_date(&self) -> NaiveDate {
        self.event_date
    }

    pub fn script(&self) -> &str {
        &self.script
    }
}

/// # Event
/// A dated block of parsed statements, executed in order when the valuation
/// reaches its date.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    event_date: NaiveDate,
    statements: Vec<Node>,
}

impl Event {
    pub fn new(event_date: NaiveDate, statements: Vec<Node>) -> Event {
        Event {
            event_date,
            statements,
        }
    }

    pub fn event_date(&self) -> NaiveDate {
        self.event_date
    }

    pub fn statements(&self) -> &[Node] {
        &self.statements
    }

    pub fn mut_statements(&mut self) -> &mut Vec<Node> {
        &mut self.statements
    }
}

impl TryFrom<CodedEvent> for Event {
    type Error = ScriptingError;

    fn try_from(event: CodedEvent) -> Result<Event> {
        let compile = || -> Result<Vec<Node>> {
            let tokens = Lexer::new(event.script()).tokenize()?;
            Parser::new(tokens).parse()
        };
        match compile() {
            Ok(statements) => Ok(Event::new(event.event_date(), statements)),
            Err(e) => Err(ScriptingError::Syntax(format!(
                "{} (event date: {})",
                e,
                event.event_date()
            ))),
        }
    }
}

/// # EventStream
/// The ordered collection of a product's events, ascending by date.
#[derive(Debug, Clone, Default)]
pub struct EventStream {
    events: Vec<Event>,
}

impl EventStream {
    pub fn new() -> EventStream {
        EventStream { events: Vec::new() }
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self.sort();
        self
    }

    pub fn add_event(&mut self, event: Event) {
        self.events.push(event);
        self.sort();
    }

    fn sort(&mut self) {
        self.events.sort_by_key(|e| e.event_date());
    }

    pub fn events(&self) -> &Vec<Event> {
        &self.events
    }

    pub fn mut_events(&mut self) -> &mut Vec<Event> {
        &mut self.events
    }

    pub fn event_dates(&self) -> Vec<NaiveDate> {
        self.events.iter().map(|e| e.event_date()).collect()
    }
}

impl TryFrom<Vec<CodedEvent>> for EventStream {
    type Error = ScriptingError;

    fn try_from(events: Vec<CodedEvent>) -> Result<EventStream> {
        let mut stream = EventStream::new();
        events.into_iter().try_for_each(|event| -> Result<()> {
            stream.events.push(Event::try_from(event)?);
            Ok(())
        })?;
        stream.sort();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn coded_event_compiles_into_statements() {
        let coded = CodedEvent::new(date(1), "X = 3");
        let event = Event::try_from(coded).unwrap();
        assert_eq!(event.statements().len(), 1);
    }

    #[test]
    fn compile_error_carries_the_event_date() {
        let coded = CodedEvent::new(date(1), "X = ");
        let err = Event::try_from(coded).unwrap_err().to_string();
        assert!(err.contains("2025-06-01"), "{}", err);
    }

    #[test]
    fn stream_orders_events_by_date() {
        let stream = EventStream::try_from(vec![
            CodedEvent::new(date(9), "Y = 2"),
            CodedEvent::new(date(3), "X = 1"),
        ])
        .unwrap();
        assert_eq!(stream.event_dates(), vec![date(3), date(9)]);
    }

    #[test]
    fn coded_event_round_trips_through_serde() {
        let coded = CodedEvent::new(date(7), "VALUE PAYS SPOT");
        let json = serde_json::to_string(&coded).unwrap();
        let back: CodedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, coded);
    }
}
