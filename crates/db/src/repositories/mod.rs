//! Repositories: one unit struct of static async methods per table.

mod asset_repo;
mod credit_repo;
mod generation_repo;

pub use asset_repo::AssetRepo;
pub use credit_repo::CreditRepo;
pub use generation_repo::GenerationRepo;
