pub mod archive;
pub mod config;
pub mod generator;
pub mod pages;
pub mod reconcile;
pub mod repository;
pub mod runtime;
pub mod sanitize;
pub mod share;
pub mod store;
pub mod tree;
pub mod upload;
