/// Score des règles : évaluation des conditions et cumul par règle
pub mod engine;
pub mod matcher;

pub use engine::{RuleEngine, RuleScore};
pub use matcher::evaluate;
