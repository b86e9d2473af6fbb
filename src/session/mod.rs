pub mod run;
pub mod types;

pub use run::{run_session, SessionOutcome};
pub use types::{Session, SessionError};
