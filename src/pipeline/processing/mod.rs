// Pure in-memory transforms: normalize, estimate, reconcile, rates, views

pub mod estimate;
pub mod normalize;
pub mod rates;
pub mod reconcile;
pub mod views;
