//! webwarden のデータモデル

mod settings;
mod status;

pub use settings::*;
pub use status::*;
