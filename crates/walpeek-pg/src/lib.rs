mod connect;
mod error;
pub mod passfile;
pub mod pgoutput;
pub mod session;
pub mod slot;
pub mod stream;

pub use error::{PgError, PgResult};
pub use session::{PgConnector, PgSession};
pub use stream::PgStream;
