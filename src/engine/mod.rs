//! Orchestration: the mapper itself and its build worker.

mod builder;
mod mapper;

pub use mapper::{Mapper, MapperHandle};
