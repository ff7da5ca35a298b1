//! Action invocations: records, status ledger, handles, and delegates.

pub mod compute;
pub mod delegate;
pub mod http;
pub mod invocation;
pub mod memory;
pub mod record;
pub mod status;

pub use compute::{
    ComputeRequirementOverrides, ComputeRequirements, ContainerParameterOverrides,
    ContainerParameters,
};
pub use delegate::InvocationDelegate;
pub use http::HttpInvocationDelegate;
pub use invocation::{Invocation, InvocationQuery, LogPages, LogStream};
pub use memory::InMemoryInvocationDelegate;
pub use record::{
    ActionProvenance, ActionReference, CreateInvocationRequest, ExecutableProvenance,
    InvocationDataSource, InvocationDataSourceType, InvocationProvenance, InvocationRecord,
    InvocationSource, LogProcess, LogRecord, LogsLocation, SourceProvenance,
};
pub use status::{InvocationStatus, InvocationStatusRecord};
