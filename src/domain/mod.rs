pub mod article;
pub mod feed_state;

pub use article::{Article, ArticleId, PageSummary};
pub use feed_state::{FeedSnapshot, FeedState};
