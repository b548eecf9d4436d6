pub mod normalize;
pub mod probe;
