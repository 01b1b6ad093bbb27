pub mod app;
pub mod cli;
pub mod config;
pub mod output;
pub mod pagination;
pub mod record;
pub mod selection;
pub mod source;
pub mod store;

#[cfg(test)]
mod tests;
