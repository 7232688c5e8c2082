pub mod luma;
pub mod traits;
