//! Command implementations for each file format

pub mod mdl;
pub mod rkv;
