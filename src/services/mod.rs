pub mod feed_loader;

pub use feed_loader::FeedLoader;
