//! Binary Ninja HTTP bridge.
//!
//! Requests are described by a [`RequestDescriptor`], executed by the
//! [`BinjaClient`] over a pluggable [`Transport`](transport::Transport), and
//! folded into uniform results by the [`Dispatcher`].

mod args;
mod cache;
pub mod client;
mod dispatcher;
pub mod error;
pub mod operations;
pub mod paging;
pub mod request;
pub mod transport;
pub mod types;

pub use client::{BinjaClient, RetryPolicy};
pub use dispatcher::{Dispatcher, MAX_READ_SIZE};
pub use error::{UpstreamError, ValidationError};
pub use operations::{Operation, ResultKind, OPERATIONS};
pub use paging::{PageBounds, PageRequest, PagingPolicy};
pub use request::{Body, Method, ParamValue, RequestDescriptor};
pub use transport::{HttpTransport, RawResponse, Transport, TransportFailure};
pub use types::{DetailRecord, EntityKind, ListEnvelope, MemoryFormat};
