pub mod access;
pub mod estimator;
pub mod scraper;
