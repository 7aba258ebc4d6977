// HTTP front of the proxy

pub mod response;
pub mod server;

pub use response::BufferedResponse;
pub use server::{router, HttpServer, HEALTH_PATH};
