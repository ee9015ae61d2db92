//! Offline evaluation of settled predictions.

pub mod calibration;
