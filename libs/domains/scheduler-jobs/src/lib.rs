//! Scheduler Jobs Domain
//!
//! Concrete, swappable-at-the-edge implementations of the three trait
//! seams the engine depends on: a data store, a reasoner provider, and
//! an endpoint caller.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────┐   ┌──────────────────────┐   ┌───────────────────────┐
//! │ InMemoryDataStoreGateway│   │ HttpReasonerProvider │   │ ReqwestEndpointCaller │
//! └────────────────────────┘   └──────────────────────┘   └───────────────────────┘
//!        implements                   implements                  implements
//!   DataStoreGateway              ReasonerProvider             EndpointCaller
//!        (scheduler-engine)        (scheduler-engine)           (scheduler-engine)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_scheduler_jobs::{HttpReasonerProvider, InMemoryDataStoreGateway, ReqwestEndpointCaller};
//!
//! let store = InMemoryDataStoreGateway::new();
//! let reasoner = HttpReasonerProvider::new("http://localhost:4000/invoke", "gpt-4", 0.2);
//! let caller = ReqwestEndpointCaller::new().expect("build http client");
//! ```

pub mod error;
pub mod http_invoker;
pub mod reasoner_http;
pub mod store_memory;

pub use error::JobsError;
pub use http_invoker::ReqwestEndpointCaller;
pub use reasoner_http::HttpReasonerProvider;
pub use store_memory::InMemoryDataStoreGateway;
