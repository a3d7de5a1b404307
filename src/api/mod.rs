pub mod binder;
pub mod dispatch;
pub mod handlers;
pub mod headers;
pub mod response;
pub mod routes;

pub use binder::{AuthDeclaration, Caller, RequestAuth};
pub use dispatch::{Endpoint, Operation};
pub use routes::create_router;
