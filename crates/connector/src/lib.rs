pub mod balancer;
pub mod client;
pub mod health;
pub mod registry;

pub use balancer::{LoadBalancer, Strategy};
pub use client::AgentConnector;
pub use health::HealthChecker;
pub use registry::InstanceRegistry;
