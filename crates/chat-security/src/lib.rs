//! # Chat Security
//! 
//! Access-token handling for the identity boundary.

pub mod jwt;

pub use jwt::{Claims, JwtError, JwtService};
