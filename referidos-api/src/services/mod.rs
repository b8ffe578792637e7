//! Request pipelines, one module per operation

pub mod admin;
pub mod claim;
pub mod portal;
pub mod submission;
