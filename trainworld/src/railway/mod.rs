//! Track and train model.

pub mod topology;
pub mod prediction;
pub mod train;
pub mod reservation;
