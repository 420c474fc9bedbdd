pub mod traits;
pub mod connectivity;
pub mod http;
pub mod wikipedia;

#[cfg(test)]
pub(crate) mod testing;

pub use traits::{Connectivity, RawResponse, Transport};
pub use connectivity::{spawn_probe, ConnectivityMonitor};
pub use http::ReqwestTransport;
pub use wikipedia::ArticleClient;
