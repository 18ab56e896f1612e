pub mod timing;

pub use timing::{instrument, Instrumentation};
