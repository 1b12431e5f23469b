mod time;
mod writer;

pub use time::{format_local, now_local};
pub use writer::ArtifactWriter;
