//! Itinerary text parsing.
//!
//! [`ItineraryParser`] splits generated prose into `Day N:` sections and reads
//! each into a [`DayRoute`](crate::types::DayRoute). Place names come from a
//! pluggable [`LocationExtractor`].

pub mod extract;
pub mod parser;

pub use extract::{CapitalizedWordExtractor, LocationExtractor};
pub use parser::{extract_day_details, split_days, DayDetails, ItineraryParser};
