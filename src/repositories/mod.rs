pub mod liquidation_repo;
pub mod order_repo;
pub mod scan_repo;
pub mod user_repo;

pub use liquidation_repo::*;
pub use order_repo::*;
pub use scan_repo::*;
pub use user_repo::*;
