//! Event source trait.

use std::convert::Infallible;

use crate::event::{RecordedEvent, SourcePosition, XamlEvent};

/// A tokenizer that emits node events in document order.
pub trait XamlEventSource<'de> {
    /// The error type for tokenizer failures.
    type Error: std::error::Error + 'static;

    /// Get the next event.
    ///
    /// Returns `Ok(None)` when the document is exhausted.
    fn next_event(&mut self) -> Result<Option<XamlEvent<'de>>, Self::Error>;

    /// Position of the event most recently returned, if known.
    fn current_position(&self) -> Option<SourcePosition> {
        None
    }
}

/// An event source over a recorded sequence.
#[derive(Debug, Clone)]
pub struct VecEventSource {
    events: std::vec::IntoIter<RecordedEvent>,
    position: Option<SourcePosition>,
}

impl VecEventSource {
    /// Replay recorded events.
    pub fn new(events: Vec<RecordedEvent>) -> Self {
        Self {
            events: events.into_iter(),
            position: None,
        }
    }

    /// Events without positions.
    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = XamlEvent<'static>>,
    {
        Self::new(
            events
                .into_iter()
                .map(|event| RecordedEvent {
                    event,
                    position: None,
                })
                .collect(),
        )
    }
}

impl XamlEventSource<'static> for VecEventSource {
    type Error = Infallible;

    fn next_event(&mut self) -> Result<Option<XamlEvent<'static>>, Self::Error> {
        Ok(self.events.next().map(|recorded| {
            self.position = recorded.position;
            recorded.event
        }))
    }

    fn current_position(&self) -> Option<SourcePosition> {
        self.position
    }
}
