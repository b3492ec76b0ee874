//! Receive-side ground station logic: receiver arbitration, pass prediction,
//! observation planning and Meteor-M LRPT decoding.

pub mod config;
pub mod decoder;
pub mod executor;
pub mod lock;
pub mod observation;
pub mod predict;
pub mod shutdown;
