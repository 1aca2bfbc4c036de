pub mod decoding;
pub mod inference;
pub mod models;
pub mod resource;
pub mod service;
pub mod t5;
