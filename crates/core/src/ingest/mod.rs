pub mod collect;
pub mod provider;
pub mod types;

pub use collect::collect_snapshots;
pub use provider::{FinancialDataSource, HttpJsonDataSource};
