use thiserror::Error;

use crate::predict::PredictError;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("No orbital elements for satellite {0}")]
    NoElements(String),
    #[error("No pass of {0} within the prediction horizon")]
    NoPass(String),
    #[error(transparent)]
    Predict(#[from] PredictError),
}
