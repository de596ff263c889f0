pub mod credentials;
pub mod middleware;
pub mod ownership;
pub mod session;
