pub mod config;
pub mod errors;
pub mod history;
pub mod parser;
pub mod scrape;
pub mod web_search;
