pub mod instance;
pub mod slow_query;
