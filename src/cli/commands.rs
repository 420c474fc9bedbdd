use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand};

use crate::config::NEXT_BATCH;

#[derive(Parser)]
#[command(name = "wikiscroll")]
#[command(about = "Endless random Wikipedia article feed")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch one batch of random articles and print them
    Fetch {
        /// Number of parallel requests in the batch
        #[arg(short, long, default_value_t = NEXT_BATCH, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        count: usize,

        /// Print articles as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Scroll through the feed: one initial load, then further pages
    Scroll {
        /// Number of "load more" pages after the initial load
        #[arg(short, long, default_value_t = 3)]
        pages: usize,

        /// Print articles as JSON lines
        #[arg(long)]
        json: bool,
    },
}
