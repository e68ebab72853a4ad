pub mod ema;
pub mod heuristic;

pub use heuristic::HeuristicPredictor;
