pub mod client;
pub mod error;
pub mod types;

pub use client::{DEFAULT_API_URL, FontApi, FontApiClient};
pub use error::ApiError;
pub use types::{
    CreateJobResponse, FontFormat, FontWeight, JobSource, JobStatusResponse, RegenerateResponse,
};
