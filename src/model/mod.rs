pub mod dispatch;
pub mod reduction;
pub mod runstate;
pub mod transformer;
pub mod weights;

pub use transformer::Transformer;
