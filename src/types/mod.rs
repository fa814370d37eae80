pub mod candle;
pub mod config;
pub mod order;
pub mod position;
pub mod signal;

pub use candle::*;
pub use config::*;
pub use order::*;
pub use position::*;
pub use signal::*;
