// Domain-layer modules: form model, rules and workflow
pub mod calendar {
    pub use crate::calendar::*;
}

pub mod enrollment {
    pub use crate::enrollment::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod pricing {
    pub use crate::pricing::*;
}

pub mod session {
    pub use crate::session::*;
}

pub mod validators {
    pub use crate::validators::*;
}

pub mod errors {
    pub use crate::errors::*;
}
