pub mod extract;
pub mod html;
pub mod normalize;

pub use extract::extract_fields;
