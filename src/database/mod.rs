pub mod pool;

pub use pool::{create_pool, create_lazy_pool, run_migrations, Database, DatabaseError};
