pub mod detail;
pub mod dom;
pub mod listing;
pub mod taxonomy;

pub use detail::{extract_detail, DetailRecord};
pub use listing::{parse_items, ItemStub};
