pub mod auth_service;
pub mod dashboard_service;
pub mod documents;
pub mod file_parser_service;
pub mod liquidation_parser;
pub mod liquidation_service;
pub mod liquidation_worker;
pub mod order_service;
pub mod product_matcher;
pub mod scan_service;
pub mod token_blacklist_service;

pub use auth_service::AuthService;
pub use dashboard_service::DashboardService;
pub use documents::DocumentService;
pub use file_parser_service::FileParserService;
pub use liquidation_service::LiquidationService;
pub use liquidation_worker::LiquidationQueue;
pub use order_service::OrderService;
pub use product_matcher::ProductMatcher;
pub use scan_service::ScanService;
pub use token_blacklist_service::TokenBlacklistService;
