pub mod numeric;
pub mod record;

pub use record::extract_listing;
