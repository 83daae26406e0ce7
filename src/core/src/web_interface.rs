// Web Interface module root
pub mod routes;
pub mod types;
pub mod web_server;

pub use routes::api_routes;
pub use web_server::WebServer;
