pub mod request_id;
pub mod retry;

pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
pub use retry::{with_retry, AlwaysRetryPolicy, RetryConfig, RetryPolicy, TransientRetryPolicy};
