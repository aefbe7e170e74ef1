//! External service integrations.

pub mod services {
    pub use crate::services::*;
}

pub mod notifier {
    pub use crate::notifier::*;
}

pub mod lookup_cache {
    pub use crate::lookup_cache::*;
}

pub mod circuit_breaker {
    pub use crate::circuit_breaker::*;
}
