pub mod app;

pub use app::{bearer, make_test_app, send};
