//! Scoring: objective profiles and finding aggregation.

pub mod aggregator;
pub mod objective;

pub use aggregator::{aggregate, AggregateOptions};
pub use objective::{ObjectiveName, ObjectiveProfile};
