//! Priority scheduling primitives.
//!
//! Two levels of priority ordering make up the scheduler: a [`RequestQueue`]
//! inside each destination pool, and an [`Admission`] heap over the pools
//! themselves.
//!
//! [`RequestQueue`]: request_queue::RequestQueue
//! [`Admission`]: admission::Admission

pub mod admission;
pub mod indexed_heap;
pub mod request_queue;
