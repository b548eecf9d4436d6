pub mod bucket;
pub mod evaluate;
pub mod flags;
pub mod metrics;
pub mod outlier;
pub mod pipeline;
