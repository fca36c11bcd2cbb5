pub mod adapters;
pub mod callbacks;
pub mod engine;
pub mod gateway;
pub mod reconciler;

pub use adapters::AdapterRegistry;
pub use callbacks::CallbackEvent;
pub use engine::{InitiationResponse, LifecycleEngine};
pub use reconciler::{CallbackReconciler, ReconcileOutcome};
