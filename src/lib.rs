pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use errors::{LifecycleError, LifecycleResult, ValidationError};
pub use lifecycle::{Action, Command, GuardError, Observation, OtpPolicy, OtpStage, TransitionGate};
pub use models::{LifecycleEvent, OrderId, OrderSnapshot, OrderStatus, OrderType, PaymentMethod};
pub use services::lifecycle_service::{LifecycleOperations, LifecycleService};
pub use state::{AppConfig, AppState};
