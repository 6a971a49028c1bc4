mod payment_routes;

pub use payment_routes::*;
