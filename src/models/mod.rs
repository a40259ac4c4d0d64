pub mod dataset;
pub mod pair;
pub mod post;

pub use dataset::Dataset;
pub use pair::Pair;
pub use post::{decode_tags, parse_timestamp, Post, PostKind};
