pub mod tokens;

pub use tokens::{AuthError, JwtValidator, TokenValidator};
