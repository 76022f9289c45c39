//! bluegreen-routing: shared load balancer plumbing.
//!
//! # Components
//!
//! - **`pools`**: environment → autoscaling group → backend pool
//!   resolution, and the `(alias, port) → pool` index
//! - **`rules`**: tagged listener rules and the terminal-action rewrite
//!   plan (promotion and pre-termination detach)

pub mod pools;
pub mod rules;

pub use pools::{EnvironmentBackend, PoolIndex, resolve_backend, shared_load_balancer};
pub use rules::{
    RewriteStats, RuleRewrite, RuleTarget, TaggedRule, aliases_forwarding_to, apply, load_rules,
    plan_detach, plan_rewrites,
};
