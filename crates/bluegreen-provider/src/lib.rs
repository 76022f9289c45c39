//! bluegreen-provider: contracts for the remote hosting platform.
//!
//! The platform is split into three collaborator traits ([`EnvironmentApi`],
//! [`LoadBalancerApi`], [`ArtifactApi`]) that return raw [`wire`] shapes
//! with optional fields. [`Clients`] bundles one implementation of each and
//! validates every response at the boundary, so the engine only ever sees
//! the domain types from `bluegreen-core`.

pub mod api;
pub mod clients;
pub mod wire;

pub use api::{
    ArtifactApi, CreateEnvironment, CreateVersion, DescribeEnvironments, EnvironmentApi,
    LoadBalancerApi, UpdateEnvironment,
};
pub use clients::Clients;
