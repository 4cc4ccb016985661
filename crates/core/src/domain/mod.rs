pub mod columns;
pub mod snapshot;
pub mod valuation;
