//! Signal fusion: quality scoring, calibration, line-movement update and
//! consensus aggregation.

pub mod aggregator;
pub mod bayesian;
pub mod calibration;
pub mod quality;
