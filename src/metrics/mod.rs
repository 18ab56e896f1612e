pub mod collector;
pub mod percentiles;
pub mod stream;

pub use collector::{FlushOutcome, FlushSnapshot, FlushStats};
pub use percentiles::PercentileSet;
