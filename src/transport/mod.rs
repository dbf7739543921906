pub mod ws;

pub use ws::UpstreamClient;
