pub mod context;
pub mod messaging;
pub mod resources;

pub use context::GlobalContextStore;
pub use messaging::CommunicationProtocol;
pub use resources::ResourcePoolManager;
