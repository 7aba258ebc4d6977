pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod interceptor;
pub mod request;

pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use interceptor::{OfflineInterceptor, Phase};
pub use request::ProxyRequest;
