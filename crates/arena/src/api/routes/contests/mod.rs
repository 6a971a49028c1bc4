mod contest_routes;

pub use contest_routes::*;
