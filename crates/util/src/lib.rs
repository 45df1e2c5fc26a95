pub mod canonical_json;
pub mod json_path;
pub mod path_processing;
pub mod text_processing;
pub mod time;

pub use canonical_json::*;
pub use json_path::*;
pub use path_processing::*;
pub use text_processing::*;
pub use time::*;
