pub mod error;
pub mod requests;
pub mod responses;


pub use error::{PoolError, Result};
pub use requests::{Headers, Method, Request, ResponseFuture};
pub use responses::Response;
